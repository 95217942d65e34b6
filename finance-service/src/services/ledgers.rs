//! Ledger derivation. Commission and operator payment rows are never
//! entered by hand: they are derived from reservation writes, either
//! through the event endpoints or the backfill jobs. Creation is
//! idempotent per booking (commissions) and per booking tour (operator
//! payments), enforced by unique constraints rather than read-then-write.

use crate::models::{
    compute_commission_amount, logistic_status_for_tour, AuditAction, AuditEntityType,
    NewAuditEntry,
};
use crate::services::audit::record_audit;
use crate::services::database::Database;
use crate::services::metrics::LEDGER_ROWS_CREATED;
use rust_decimal::Decimal;
use serde_json::json;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

/// Fields for one operator payment insert, resolved by the caller.
pub(crate) struct NewOperatorPayment<'a> {
    pub booking_tour_id: Uuid,
    pub booking_id: Uuid,
    pub operator_name: &'a str,
    pub operation_type: &'a str,
    pub cost_amount: Decimal,
    pub currency: &'a str,
    pub logistic_status: &'a str,
}

/// Reacts to reservation writes by keeping the ledgers in step.
#[derive(Clone)]
pub struct LedgerEvents {
    db: Database,
    default_commission_rate: Decimal,
    operator_cost_percentage: Decimal,
}

impl LedgerEvents {
    pub fn new(
        db: Database,
        default_commission_rate: Decimal,
        operator_cost_percentage: Decimal,
    ) -> Self {
        Self {
            db,
            default_commission_rate,
            operator_cost_percentage,
        }
    }

    /// A booking was created or updated: make sure its commission exists,
    /// then bring the cost figures up to date. Returns the new commission
    /// ID when one was created.
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn on_booking_persisted(
        &self,
        booking_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let created = self
            .create_commission_in(&mut tx, booking_id, None, actor)
            .await?;
        self.refresh_commission_costs_in(&mut tx, booking_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        if created.is_some() {
            LEDGER_ROWS_CREATED
                .with_label_values(&["commission", "event"])
                .inc();
        }

        Ok(created)
    }

    /// A booking tour was created or updated: make sure its operator
    /// payment exists (when one is owed), then refresh the commission
    /// costs on the parent booking.
    #[instrument(skip(self), fields(booking_tour_id = %booking_tour_id))]
    pub async fn on_booking_tour_persisted(
        &self,
        booking_tour_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let created = self
            .create_operator_payment_in(&mut tx, booking_tour_id, actor)
            .await?;

        let booking_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT booking_id FROM booking_tours WHERE id = $1",
        )
        .bind(booking_tour_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load booking tour: {}", e)))?;

        self.refresh_commission_costs_in(&mut tx, booking_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        if created.is_some() {
            LEDGER_ROWS_CREATED
                .with_label_values(&["operator_payment", "event"])
                .inc();
        }

        Ok(created)
    }

    /// Create the commission for a booking if none exists. Skips bookings
    /// with no tour lines. The rate comes from the salesperson's profile,
    /// then the caller's override, then the configured default.
    pub(crate) async fn create_commission_in(
        &self,
        conn: &mut PgConnection,
        booking_id: Uuid,
        rate_override: Option<Decimal>,
        actor: Option<Uuid>,
    ) -> Result<Option<Uuid>, AppError> {
        let booking = sqlx::query_as::<_, (String, Option<Uuid>, Option<Decimal>)>(
            r#"
            SELECT b.currency, b.sales_person_id, u.commission_rate
            FROM bookings b
            LEFT JOIN users u ON u.id = b.sales_person_id
            WHERE b.id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load booking: {}", e)))?;

        let Some((currency, salesperson_id, salesperson_rate)) = booking else {
            return Err(AppError::NotFound(anyhow::anyhow!("Booking not found")));
        };

        let (gross_total, tour_count) = sqlx::query_as::<_, (Decimal, i64)>(
            "SELECT COALESCE(SUM(subtotal), 0), COUNT(*) FROM booking_tours WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to total booking tours: {}", e))
        })?;

        // Nothing to commission until the booking has at least one tour.
        if tour_count == 0 {
            return Ok(None);
        }

        let percentage = salesperson_rate
            .or(rate_override)
            .unwrap_or(self.default_commission_rate);
        let net_received = gross_total;
        let commission_amount = compute_commission_amount(net_received, percentage);

        let commission_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO commissions (booking_id, salesperson_id, gross_total, costs, net_received,
                                     commission_percentage, commission_amount, currency, created_by)
            VALUES ($1, $2, $3, 0, $4, $5, $6, $7, $8)
            ON CONFLICT (booking_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(booking_id)
        .bind(salesperson_id)
        .bind(gross_total)
        .bind(net_received)
        .bind(percentage)
        .bind(commission_amount)
        .bind(&currency)
        .bind(actor)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create commission: {}", e))
        })?;

        let Some(commission_id) = commission_id else {
            return Ok(None);
        };

        let mut entry =
            NewAuditEntry::new(AuditEntityType::Commission, commission_id, AuditAction::Create);
        entry.performed_by = actor;
        entry.booking_id = Some(booking_id);
        entry.new_value = Some(json!({
            "gross_total": gross_total,
            "commission_percentage": percentage,
            "commission_amount": commission_amount,
            "currency": currency,
        }));
        record_audit(conn, &entry).await?;

        info!(commission_id = %commission_id, booking_id = %booking_id, "Commission created");

        Ok(Some(commission_id))
    }

    /// Create the operator payment for a tour if one is owed and none
    /// exists. Only bought-in tours with a named operator qualify here;
    /// the backfill job casts a wider net.
    pub(crate) async fn create_operator_payment_in(
        &self,
        conn: &mut PgConnection,
        booking_tour_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Option<Uuid>, AppError> {
        let tour = sqlx::query_as::<_, (Uuid, Decimal, String, String, String, String)>(
            r#"
            SELECT bt.booking_id, bt.subtotal, bt.operator, bt.operator_name, bt.tour_status,
                   b.currency
            FROM booking_tours bt
            JOIN bookings b ON b.id = bt.booking_id
            WHERE bt.id = $1
            "#,
        )
        .bind(booking_tour_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load booking tour: {}", e)))?;

        let Some((booking_id, subtotal, operator, operator_name, tour_status, currency)) = tour
        else {
            return Err(AppError::NotFound(anyhow::anyhow!("Booking tour not found")));
        };

        if operator != "third-party" || operator_name.trim().is_empty() {
            return Ok(None);
        }

        let cost_amount = subtotal * self.operator_cost_percentage / Decimal::ONE_HUNDRED;
        let logistic_status = logistic_status_for_tour(&tour_status);

        self.insert_operator_payment_in(
            conn,
            &NewOperatorPayment {
                booking_tour_id,
                booking_id,
                operator_name: &operator_name,
                operation_type: "third-party",
                cost_amount,
                currency: &currency,
                logistic_status: logistic_status.as_str(),
            },
            actor,
        )
        .await
    }

    /// Insert one operator payment, skipping tours that already have one.
    pub(crate) async fn insert_operator_payment_in(
        &self,
        conn: &mut PgConnection,
        new: &NewOperatorPayment<'_>,
        actor: Option<Uuid>,
    ) -> Result<Option<Uuid>, AppError> {
        let payment_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO operator_payments (booking_tour_id, operator_name, operation_type,
                                           cost_amount, currency, logistic_status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (booking_tour_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(new.booking_tour_id)
        .bind(new.operator_name)
        .bind(new.operation_type)
        .bind(new.cost_amount)
        .bind(new.currency)
        .bind(new.logistic_status)
        .bind(actor)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create operator payment: {}", e))
        })?;

        let Some(payment_id) = payment_id else {
            return Ok(None);
        };

        let mut entry = NewAuditEntry::new(
            AuditEntityType::OperatorPayment,
            payment_id,
            AuditAction::Create,
        );
        entry.performed_by = actor;
        entry.booking_id = Some(new.booking_id);
        entry.new_value = Some(json!({
            "operator_name": new.operator_name,
            "cost_amount": new.cost_amount,
            "currency": new.currency,
            "logistic_status": new.logistic_status,
        }));
        record_audit(conn, &entry).await?;

        info!(
            payment_id = %payment_id,
            booking_tour_id = %new.booking_tour_id,
            operator = new.operator_name,
            "Operator payment created"
        );

        Ok(Some(payment_id))
    }

    /// Re-derive a booking's commission costs from its operator payments.
    /// Closed commissions keep the figures they were settled with, so only
    /// open rows are touched.
    pub(crate) async fn refresh_commission_costs_in(
        &self,
        conn: &mut PgConnection,
        booking_id: Uuid,
    ) -> Result<bool, AppError> {
        let costs = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(op.cost_amount), 0)
            FROM operator_payments op
            JOIN booking_tours bt ON bt.id = op.booking_tour_id
            WHERE bt.booking_id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to total operator costs: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE commissions
            SET costs = $2,
                net_received = gross_total - $2,
                commission_amount = (gross_total - $2) * commission_percentage / 100,
                updated_at = NOW()
            WHERE booking_id = $1 AND is_closed = FALSE
            "#,
        )
        .bind(booking_id)
        .bind(costs)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to refresh commission costs: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }
}
