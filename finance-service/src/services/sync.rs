//! Backfill jobs for historical bookings that predate the ledgers.
//!
//! Both jobs run inside one top-level transaction and share the
//! derivation code with the event path, so a backfilled row is
//! indistinguishable from one created live. Under dry-run the
//! transaction is rolled back wholesale after the counts are taken.

use crate::models::logistic_status_for_tour;
use crate::services::database::Database;
use crate::services::ledgers::{LedgerEvents, NewOperatorPayment};
use crate::services::metrics::LEDGER_ROWS_CREATED;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CommissionSyncOptions {
    pub dry_run: bool,
    /// Rate for bookings whose salesperson has no stored rate.
    pub commission_rate: Decimal,
}

#[derive(Debug, Clone)]
pub struct OperatorSyncOptions {
    pub dry_run: bool,
    /// Cover tours of any operator type, not just bought-in ones.
    pub all_operators: bool,
    /// Share of the tour subtotal recorded as estimated cost.
    pub cost_percentage: Decimal,
}

/// What a sync pass did (or would have done, under dry-run).
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub examined: usize,
    pub created: usize,
    pub dry_run: bool,
}

/// Runs the offline backfills.
pub struct SyncService {
    db: Database,
    events: LedgerEvents,
}

impl SyncService {
    pub fn new(db: Database, events: LedgerEvents) -> Self {
        Self { db, events }
    }

    /// Create missing commissions (and the operator payments of their
    /// third-party tours) for every booking that has tour lines but no
    /// commission row. Running it twice creates nothing the second time.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn sync_commissions(
        &self,
        options: &CommissionSyncOptions,
    ) -> Result<SyncReport, AppError> {
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let booking_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT b.id
            FROM bookings b
            WHERE EXISTS (SELECT 1 FROM booking_tours bt WHERE bt.booking_id = b.id)
              AND NOT EXISTS (SELECT 1 FROM commissions c WHERE c.booking_id = b.id)
            ORDER BY b.created_at
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list bookings to sync: {}", e))
        })?;

        let mut report = SyncReport {
            examined: booking_ids.len(),
            created: 0,
            dry_run: options.dry_run,
        };

        for booking_id in booking_ids {
            let created = self
                .events
                .create_commission_in(&mut tx, booking_id, Some(options.commission_rate), None)
                .await?;
            if created.is_none() {
                continue;
            }
            report.created += 1;

            let tour_ids = sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT bt.id
                FROM booking_tours bt
                WHERE bt.booking_id = $1
                  AND bt.operator = 'third-party'
                  AND bt.operator_name <> ''
                  AND NOT EXISTS (SELECT 1 FROM operator_payments op
                                  WHERE op.booking_tour_id = bt.id)
                "#,
            )
            .bind(booking_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to list booking tours: {}", e))
            })?;

            for tour_id in tour_ids {
                self.events
                    .create_operator_payment_in(&mut tx, tour_id, None)
                    .await?;
            }
            self.events
                .refresh_commission_costs_in(&mut tx, booking_id)
                .await?;

            info!(booking_id = %booking_id, "Commission backfilled");
        }

        if options.dry_run {
            tx.rollback().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to roll back dry run: {}", e))
            })?;
            info!(created = report.created, "Commission sync dry run rolled back");
        } else {
            tx.commit().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to commit sync: {}", e))
            })?;
            LEDGER_ROWS_CREATED
                .with_label_values(&["commission", "sync"])
                .inc_by(report.created as f64);
        }

        Ok(report)
    }

    /// Create missing operator payments for booking tours. By default
    /// only bought-in tours with a named operator qualify;
    /// `all_operators` widens it to every tour, recording own-operation
    /// rows with the tour name (or "Unknown") as the operator.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run, all = options.all_operators))]
    pub async fn sync_operator_payments(
        &self,
        options: &OperatorSyncOptions,
    ) -> Result<SyncReport, AppError> {
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let tours = sqlx::query_as::<
            _,
            (Uuid, Uuid, Decimal, String, String, String, String, String),
        >(
            r#"
            SELECT bt.id, bt.booking_id, bt.subtotal, bt.operator, bt.operator_name,
                   bt.tour_status, b.currency, t.name
            FROM booking_tours bt
            JOIN bookings b ON b.id = bt.booking_id
            JOIN tours t ON t.id = bt.tour_id
            WHERE NOT EXISTS (SELECT 1 FROM operator_payments op
                              WHERE op.booking_tour_id = bt.id)
              AND ($1 OR (bt.operator = 'third-party' AND bt.operator_name <> ''))
            ORDER BY bt.date
            "#,
        )
        .bind(options.all_operators)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list tours to sync: {}", e))
        })?;

        let mut report = SyncReport {
            examined: tours.len(),
            created: 0,
            dry_run: options.dry_run,
        };
        let mut touched_bookings = Vec::new();

        for (tour_id, booking_id, subtotal, operator, operator_name, tour_status, currency, tour_name) in
            tours
        {
            let operation_type = if operator == "third-party" {
                "third-party"
            } else {
                "own-operation"
            };
            let operator_name = if !operator_name.trim().is_empty() {
                operator_name
            } else if !tour_name.trim().is_empty() {
                tour_name
            } else {
                "Unknown".to_string()
            };
            let cost_amount = subtotal * options.cost_percentage / Decimal::ONE_HUNDRED;
            let logistic_status = logistic_status_for_tour(&tour_status);

            let created = self
                .events
                .insert_operator_payment_in(
                    &mut tx,
                    &NewOperatorPayment {
                        booking_tour_id: tour_id,
                        booking_id,
                        operator_name: &operator_name,
                        operation_type,
                        cost_amount,
                        currency: &currency,
                        logistic_status: logistic_status.as_str(),
                    },
                    None,
                )
                .await?;
            if created.is_some() {
                report.created += 1;
                touched_bookings.push(booking_id);
                info!(booking_tour_id = %tour_id, operator = %operator_name, "Operator payment backfilled");
            }
        }

        touched_bookings.sort_unstable();
        touched_bookings.dedup();
        for booking_id in touched_bookings {
            self.events
                .refresh_commission_costs_in(&mut tx, booking_id)
                .await?;
        }

        if options.dry_run {
            tx.rollback().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to roll back dry run: {}", e))
            })?;
            info!(created = report.created, "Operator sync dry run rolled back");
        } else {
            tx.commit().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to commit sync: {}", e))
            })?;
            LEDGER_ROWS_CREATED
                .with_label_values(&["operator_payment", "sync"])
                .inc_by(report.created as f64);
        }

        Ok(report)
    }
}
