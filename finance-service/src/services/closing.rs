//! Closing engine. Groups open ledger rows into an immutable closing
//! batch with a generated invoice number and a linked payable expense,
//! and supports undoing a batch wholesale.
//!
//! Both ledgers close the same way, so the engine is written once against
//! `ClosableLedger` and the two implementations only contribute their SQL.
//! Every mutation runs inside one transaction: the closing row, the item
//! stamps, the expense and the audit entries land together or not at all.

use crate::models::{
    format_invoice_number, AuditAction, AuditEntityType, ClosingType, CommissionClosing,
    NewAuditEntry,
};
use crate::services::audit::record_audit;
use crate::services::database::Database;
use crate::services::metrics::CLOSING_ACTIONS_TOTAL;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// One open ledger row as the engine sees it.
#[derive(Debug, FromRow)]
struct ClosableItem {
    id: Uuid,
    booking_id: Option<Uuid>,
    amount: Decimal,
    closable: bool,
}

/// A row reopened by an undo, with the invoice number it carried.
#[derive(Debug, FromRow)]
struct ReopenedItem {
    id: Uuid,
    booking_id: Option<Uuid>,
    invoice_number: Option<String>,
}

/// The SQL half of a closable ledger. The engine drives the flow; an
/// implementation says how its rows are read, adjusted and stamped.
#[async_trait]
trait ClosableLedger: Send + Sync {
    fn entity_type(&self) -> AuditEntityType;
    fn expense_label(&self) -> &'static str;
    fn expense_category(&self) -> &'static str;

    /// Load the still-open rows among `ids`. Closed and unknown ids fall
    /// out of the result, which is what excludes them from the batch.
    async fn load_open_items(
        &self,
        conn: &mut PgConnection,
        ids: &[Uuid],
    ) -> Result<Vec<ClosableItem>, AppError>;

    async fn apply_adjustment(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        amount: Decimal,
    ) -> Result<(), AppError>;

    async fn stamp_closed(
        &self,
        conn: &mut PgConnection,
        ids: &[Uuid],
        closing_id: Uuid,
        invoice_number: &str,
        closed_by: Option<Uuid>,
    ) -> Result<(), AppError>;

    /// Clear the closing fields on every member row and report what was
    /// reopened.
    async fn reopen_items(
        &self,
        conn: &mut PgConnection,
        closing_id: Uuid,
    ) -> Result<Vec<ReopenedItem>, AppError>;
}

struct CommissionLedger;

#[async_trait]
impl ClosableLedger for CommissionLedger {
    fn entity_type(&self) -> AuditEntityType {
        AuditEntityType::Commission
    }

    fn expense_label(&self) -> &'static str {
        "Commission payment"
    }

    fn expense_category(&self) -> &'static str {
        "commission"
    }

    async fn load_open_items(
        &self,
        conn: &mut PgConnection,
        ids: &[Uuid],
    ) -> Result<Vec<ClosableItem>, AppError> {
        sqlx::query_as::<_, ClosableItem>(
            r#"
            SELECT id, booking_id, commission_amount AS amount, TRUE AS closable
            FROM commissions
            WHERE id = ANY($1) AND is_closed = FALSE
            "#,
        )
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load open commissions: {}", e))
        })
    }

    async fn apply_adjustment(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        amount: Decimal,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE commissions SET commission_amount = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(amount)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to adjust commission: {}", e))
        })?;
        Ok(())
    }

    async fn stamp_closed(
        &self,
        conn: &mut PgConnection,
        ids: &[Uuid],
        closing_id: Uuid,
        invoice_number: &str,
        closed_by: Option<Uuid>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE commissions
            SET is_closed = TRUE, closed_at = NOW(), closed_by = $3, closing_id = $2,
                invoice_number = $4, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(closing_id)
        .bind(closed_by)
        .bind(invoice_number)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to close commissions: {}", e))
        })?;
        Ok(())
    }

    async fn reopen_items(
        &self,
        conn: &mut PgConnection,
        closing_id: Uuid,
    ) -> Result<Vec<ReopenedItem>, AppError> {
        let items = sqlx::query_as::<_, ReopenedItem>(
            "SELECT id, booking_id, invoice_number FROM commissions WHERE closing_id = $1",
        )
        .bind(closing_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load closing commissions: {}", e))
        })?;

        sqlx::query(
            r#"
            UPDATE commissions
            SET is_closed = FALSE, closed_at = NULL, closed_by = NULL, closing_id = NULL,
                invoice_number = NULL, updated_at = NOW()
            WHERE closing_id = $1
            "#,
        )
        .bind(closing_id)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to reopen commissions: {}", e))
        })?;

        Ok(items)
    }
}

struct OperatorLedger;

#[async_trait]
impl ClosableLedger for OperatorLedger {
    fn entity_type(&self) -> AuditEntityType {
        AuditEntityType::OperatorPayment
    }

    fn expense_label(&self) -> &'static str {
        "Operator payment"
    }

    fn expense_category(&self) -> &'static str {
        "other"
    }

    async fn load_open_items(
        &self,
        conn: &mut PgConnection,
        ids: &[Uuid],
    ) -> Result<Vec<ClosableItem>, AppError> {
        sqlx::query_as::<_, ClosableItem>(
            r#"
            SELECT op.id, bt.booking_id, op.cost_amount AS amount,
                   (op.logistic_status <> 'pending') AS closable
            FROM operator_payments op
            JOIN booking_tours bt ON bt.id = op.booking_tour_id
            WHERE op.id = ANY($1) AND op.is_closed = FALSE
            "#,
        )
        .bind(ids)
        .fetch_all(conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load open operator payments: {}", e))
        })
    }

    async fn apply_adjustment(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        amount: Decimal,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE operator_payments SET cost_amount = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(amount)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to adjust operator payment: {}", e))
        })?;
        Ok(())
    }

    async fn stamp_closed(
        &self,
        conn: &mut PgConnection,
        ids: &[Uuid],
        closing_id: Uuid,
        invoice_number: &str,
        closed_by: Option<Uuid>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE operator_payments
            SET is_closed = TRUE, closed_at = NOW(), closed_by = $3, closing_id = $2,
                invoice_number = $4, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(closing_id)
        .bind(closed_by)
        .bind(invoice_number)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to close operator payments: {}", e))
        })?;
        Ok(())
    }

    async fn reopen_items(
        &self,
        conn: &mut PgConnection,
        closing_id: Uuid,
    ) -> Result<Vec<ReopenedItem>, AppError> {
        let items = sqlx::query_as::<_, ReopenedItem>(
            r#"
            SELECT op.id, bt.booking_id, op.invoice_number
            FROM operator_payments op
            JOIN booking_tours bt ON bt.id = op.booking_tour_id
            WHERE op.closing_id = $1
            "#,
        )
        .bind(closing_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to load closing operator payments: {}",
                e
            ))
        })?;

        sqlx::query(
            r#"
            UPDATE operator_payments
            SET is_closed = FALSE, closed_at = NULL, closed_by = NULL, closing_id = NULL,
                invoice_number = NULL, updated_at = NOW()
            WHERE closing_id = $1
            "#,
        )
        .bind(closing_id)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to reopen operator payments: {}", e))
        })?;

        Ok(items)
    }
}

/// Everything one close request carries, already validated at the edge.
pub struct CloseCommand {
    pub item_ids: Vec<Uuid>,
    pub closing_type: ClosingType,
    pub recipient_name: String,
    pub recipient_id: Option<Uuid>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub currency: String,
    pub adjustments: HashMap<Uuid, Decimal>,
    pub actor: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of a close attempt. `Blocked` means nothing was committed.
pub enum CloseOutcome {
    Closed {
        closing: CommissionClosing,
        expense_id: Uuid,
    },
    Blocked {
        non_closable_ids: Vec<Uuid>,
    },
}

/// Drives close and undo over both ledgers.
#[derive(Clone)]
pub struct ClosingEngine {
    db: Database,
}

impl ClosingEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Close a batch of commissions under a salesperson or agency
    /// closing.
    #[instrument(skip(self, cmd), fields(closing_type = %cmd.closing_type, items = cmd.item_ids.len()))]
    pub async fn close_commissions(&self, cmd: CloseCommand) -> Result<CloseOutcome, AppError> {
        if cmd.closing_type == ClosingType::Operator {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Commission closings must use closing_type 'salesperson' or 'agency'"
            )));
        }
        self.run_close(&CommissionLedger, cmd).await
    }

    /// Close a batch of operator payments.
    #[instrument(skip(self, cmd), fields(items = cmd.item_ids.len()))]
    pub async fn close_operator_payments(
        &self,
        cmd: CloseCommand,
    ) -> Result<CloseOutcome, AppError> {
        if cmd.closing_type != ClosingType::Operator {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Operator closings must use closing_type 'operator'"
            )));
        }
        self.run_close(&OperatorLedger, cmd).await
    }

    /// Undo a closing: reopen every member row, delete the linked
    /// expense and retire the closing. The invoice number is not reused.
    #[instrument(skip(self, actor, ip_address, user_agent), fields(closing_id = %closing_id))]
    pub async fn undo(
        &self,
        closing_id: Uuid,
        reason: &str,
        actor: Option<Uuid>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<usize, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A reason is required to undo a closing"
            )));
        }

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let closing = sqlx::query_as::<_, CommissionClosing>(
            r#"
            SELECT id, closing_type, recipient_name, recipient_id, period_start, period_end,
                   total_amount, currency, item_count, invoice_number, invoice_file, expense_id,
                   is_active, undone_at, undone_by, undo_reason, created_by, created_at
            FROM commission_closings
            WHERE id = $1
            "#,
        )
        .bind(closing_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load closing: {}", e)))?;

        let Some(closing) = closing else {
            return Err(AppError::NotFound(anyhow::anyhow!("Closing not found")));
        };

        // An undone closing is gone as far as callers are concerned.
        if !closing.is_active {
            return Err(AppError::NotFound(anyhow::anyhow!("Closing not found")));
        }

        let closing_type = ClosingType::parse(&closing.closing_type).ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Closing {} has unrecognized type '{}'",
                closing.id,
                closing.closing_type
            ))
        })?;
        let ledger: &dyn ClosableLedger = match closing_type {
            ClosingType::Operator => &OperatorLedger,
            _ => &CommissionLedger,
        };

        let reopened = ledger.reopen_items(&mut tx, closing.id).await?;

        for item in &reopened {
            let mut entry =
                NewAuditEntry::new(ledger.entity_type(), item.id, AuditAction::Reopen);
            entry.performed_by = actor;
            entry.booking_id = item.booking_id;
            entry.old_value = Some(json!({
                "is_closed": true,
                "invoice_number": item.invoice_number,
            }));
            entry.new_value = Some(json!({
                "is_closed": false,
                "invoice_number": null,
            }));
            entry.reason = Some(reason.to_string());
            entry.closing_id = Some(closing.id);
            entry.ip_address = ip_address.clone();
            entry.user_agent = user_agent.clone();
            record_audit(&mut tx, &entry).await?;
        }

        if let Some(expense_id) = closing.expense_id {
            sqlx::query("DELETE FROM expenses WHERE id = $1")
                .bind(expense_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Failed to delete closing expense: {}",
                        e
                    ))
                })?;
        }

        sqlx::query(
            r#"
            UPDATE commission_closings
            SET is_active = FALSE, undone_at = NOW(), undone_by = $2, undo_reason = $3
            WHERE id = $1
            "#,
        )
        .bind(closing.id)
        .bind(actor)
        .bind(reason)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to retire closing: {}", e)))?;

        let mut entry = NewAuditEntry::new(AuditEntityType::Closing, closing.id, AuditAction::Reopen);
        entry.performed_by = actor;
        entry.old_value = Some(json!({ "is_active": true }));
        entry.new_value = Some(json!({ "is_active": false, "reopened_count": reopened.len() }));
        entry.reason = Some(reason.to_string());
        entry.closing_id = Some(closing.id);
        entry.ip_address = ip_address;
        entry.user_agent = user_agent;
        record_audit(&mut tx, &entry).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit undo: {}", e))
        })?;

        CLOSING_ACTIONS_TOTAL
            .with_label_values(&[closing_type.as_str(), "undo"])
            .inc();

        info!(
            closing_id = %closing.id,
            invoice_number = %closing.invoice_number,
            reopened = reopened.len(),
            "Closing undone"
        );

        Ok(reopened.len())
    }

    async fn run_close(
        &self,
        ledger: &dyn ClosableLedger,
        cmd: CloseCommand,
    ) -> Result<CloseOutcome, AppError> {
        if cmd.item_ids.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!("No item ids supplied")));
        }
        if cmd.recipient_name.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "recipient_name is required"
            )));
        }
        if cmd.period_end < cmd.period_start {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "period_end is before period_start"
            )));
        }

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Closed and unknown ids drop out here; they are excluded, not
        // errors. Items whose state forbids settlement abort the batch.
        let items = ledger.load_open_items(&mut tx, &cmd.item_ids).await?;

        let non_closable_ids: Vec<Uuid> = items
            .iter()
            .filter(|item| !item.closable)
            .map(|item| item.id)
            .collect();
        if !non_closable_ids.is_empty() {
            tx.rollback().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to roll back: {}", e))
            })?;
            CLOSING_ACTIONS_TOTAL
                .with_label_values(&[cmd.closing_type.as_str(), "blocked"])
                .inc();
            return Ok(CloseOutcome::Blocked { non_closable_ids });
        }

        if items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "No open items to close"
            )));
        }

        // Final per-item amounts, with adjustments folded in before the
        // total is taken.
        let final_amounts: Vec<(Uuid, Option<Uuid>, Decimal, Decimal)> = items
            .iter()
            .map(|item| {
                let adjusted = cmd.adjustments.get(&item.id).copied().unwrap_or(item.amount);
                (item.id, item.booking_id, item.amount, adjusted)
            })
            .collect();
        let total_amount: Decimal = final_amounts.iter().map(|(_, _, _, amount)| *amount).sum();
        let item_count = final_amounts.len() as i32;

        let year = Utc::now().year();
        let sequence = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO closing_invoice_counters (closing_type, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (closing_type, year)
            DO UPDATE SET last_value = closing_invoice_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(cmd.closing_type.as_str())
        .bind(year)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to advance invoice counter: {}", e))
        })?;
        let invoice_number = format_invoice_number(cmd.closing_type, year, sequence);

        let expense_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO expenses (name, expense_type, category, description, amount, currency,
                                  payment_status, due_date, vendor, invoice_number, created_by)
            VALUES ($1, 'variable', $2, $3, $4, $5, 'pending', $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(format!("{} - {}", ledger.expense_label(), cmd.recipient_name))
        .bind(ledger.expense_category())
        .bind(format!("Created by closing {}", invoice_number))
        .bind(total_amount)
        .bind(&cmd.currency)
        .bind(cmd.period_end)
        .bind(&cmd.recipient_name)
        .bind(&invoice_number)
        .bind(cmd.actor)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create closing expense: {}", e))
        })?;

        let closing = sqlx::query_as::<_, CommissionClosing>(
            r#"
            INSERT INTO commission_closings (closing_type, recipient_name, recipient_id,
                                             period_start, period_end, total_amount, currency,
                                             item_count, invoice_number, expense_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, closing_type, recipient_name, recipient_id, period_start, period_end,
                      total_amount, currency, item_count, invoice_number, invoice_file,
                      expense_id, is_active, undone_at, undone_by, undo_reason, created_by,
                      created_at
            "#,
        )
        .bind(cmd.closing_type.as_str())
        .bind(&cmd.recipient_name)
        .bind(cmd.recipient_id)
        .bind(cmd.period_start)
        .bind(cmd.period_end)
        .bind(total_amount)
        .bind(&cmd.currency)
        .bind(item_count)
        .bind(&invoice_number)
        .bind(expense_id)
        .bind(cmd.actor)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create closing: {}", e)))?;

        for (id, booking_id, old_amount, new_amount) in &final_amounts {
            if old_amount == new_amount {
                continue;
            }
            ledger.apply_adjustment(&mut tx, *id, *new_amount).await?;

            let mut entry = NewAuditEntry::new(ledger.entity_type(), *id, AuditAction::Adjust);
            entry.performed_by = cmd.actor;
            entry.booking_id = *booking_id;
            entry.old_value = Some(json!({ "amount": old_amount }));
            entry.new_value = Some(json!({ "amount": new_amount }));
            entry.closing_id = Some(closing.id);
            entry.ip_address = cmd.ip_address.clone();
            entry.user_agent = cmd.user_agent.clone();
            record_audit(&mut tx, &entry).await?;
        }

        let member_ids: Vec<Uuid> = final_amounts.iter().map(|(id, _, _, _)| *id).collect();
        ledger
            .stamp_closed(&mut tx, &member_ids, closing.id, &invoice_number, cmd.actor)
            .await?;

        for (id, booking_id, _, new_amount) in &final_amounts {
            let mut entry = NewAuditEntry::new(ledger.entity_type(), *id, AuditAction::Close);
            entry.performed_by = cmd.actor;
            entry.booking_id = *booking_id;
            entry.old_value = Some(json!({ "is_closed": false, "invoice_number": null }));
            entry.new_value = Some(json!({
                "is_closed": true,
                "invoice_number": invoice_number,
                "amount": new_amount,
            }));
            entry.closing_id = Some(closing.id);
            entry.ip_address = cmd.ip_address.clone();
            entry.user_agent = cmd.user_agent.clone();
            record_audit(&mut tx, &entry).await?;
        }

        let mut entry = NewAuditEntry::new(AuditEntityType::Closing, closing.id, AuditAction::Close);
        entry.performed_by = cmd.actor;
        entry.new_value = Some(json!({
            "invoice_number": invoice_number,
            "total_amount": total_amount,
            "item_count": item_count,
            "recipient_name": cmd.recipient_name,
        }));
        entry.closing_id = Some(closing.id);
        entry.ip_address = cmd.ip_address.clone();
        entry.user_agent = cmd.user_agent.clone();
        record_audit(&mut tx, &entry).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit closing: {}", e))
        })?;

        CLOSING_ACTIONS_TOTAL
            .with_label_values(&[cmd.closing_type.as_str(), "close"])
            .inc();

        info!(
            closing_id = %closing.id,
            invoice_number = %invoice_number,
            total_amount = %total_amount,
            item_count = item_count,
            "Closing created"
        );

        Ok(CloseOutcome::Closed {
            closing,
            expense_id,
        })
    }
}
