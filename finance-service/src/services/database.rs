//! Database service for finance-service: pool plumbing plus the CRUD and
//! list/summary queries. The closing engine, derivation pipeline and
//! reports own their SQL and run it against this pool.

use crate::models::{
    AccountFilters, BankTransfer, ClosingFilters, Commission, CommissionAuditLog,
    CommissionClosing, CommissionFilters, CommissionListRow, CommissionStatus, CommissionSummary,
    CommissionUniqueValues, CreateAccountRequest, CreateExpenseRequest, CreateTransferRequest,
    Expense, ExpenseFilters, ExpenseSummary, CategoryBreakdown, FinancialAccount, LogisticStatus,
    OperatorFilters, OperatorPayment, OperatorPaymentListRow, OperatorSummary,
    OperatorUniqueValues, TourOption, UpdateAccountRequest, UpdateCommissionRequest,
    UpdateExpenseRequest, UpdateOperatorPaymentRequest, compute_commission_amount,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "finance-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Resolve an API token to an active user: (id, full_name, is_staff).
    #[instrument(skip(self, token))]
    pub async fn find_user_by_token(
        &self,
        token: &str,
    ) -> Result<Option<(Uuid, String, bool)>, AppError> {
        sqlx::query_as::<_, (Uuid, String, bool)>(
            r#"
            SELECT id, full_name, is_staff
            FROM users
            WHERE auth_token = $1 AND is_active = TRUE
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve token: {}", e)))
    }

    // -------------------------------------------------------------------------
    // Commission Operations
    // -------------------------------------------------------------------------

    /// Get a commission by ID.
    #[instrument(skip(self), fields(commission_id = %commission_id))]
    pub async fn get_commission(&self, commission_id: Uuid) -> Result<Commission, AppError> {
        let commission = sqlx::query_as::<_, Commission>(
            r#"
            SELECT id, booking_id, salesperson_id, external_agency, gross_total, costs,
                   net_received, commission_percentage, commission_amount, currency, status,
                   payment_date, notes, is_closed, closed_at, closed_by, closing_id,
                   invoice_number, created_by, created_at, updated_at
            FROM commissions
            WHERE id = $1
            "#,
        )
        .bind(commission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get commission: {}", e)))?;

        commission.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Commission not found")))
    }

    /// List commissions with booking context, newest sale first. The date
    /// range only applies when both ends are present; `date_kind` picks
    /// whether it matches the sale date or any tour date.
    #[instrument(skip(self, filters))]
    pub async fn list_commissions(
        &self,
        filters: &CommissionFilters,
    ) -> Result<Vec<CommissionListRow>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_commissions"])
            .start_timer();

        let rows = sqlx::query_as::<_, CommissionListRow>(
            r#"
            SELECT c.id, c.booking_id, c.salesperson_id, c.external_agency, c.gross_total,
                   c.costs, c.net_received, c.commission_percentage, c.commission_amount,
                   c.currency, c.status, c.payment_date, c.notes, c.is_closed, c.closed_at,
                   c.closing_id, c.invoice_number, c.created_at,
                   cu.name AS customer_name,
                   u.full_name AS salesperson_name,
                   b.status AS booking_status,
                   b.created_at AS sale_date,
                   (SELECT MIN(bt.date) FROM booking_tours bt WHERE bt.booking_id = b.id) AS operation_date,
                   ARRAY(SELECT DISTINCT t.name FROM booking_tours bt
                         JOIN tours t ON t.id = bt.tour_id
                         WHERE bt.booking_id = b.id) AS tour_names
            FROM commissions c
            JOIN bookings b ON b.id = c.booking_id
            JOIN customers cu ON cu.id = b.customer_id
            LEFT JOIN users u ON u.id = c.salesperson_id
            WHERE ($1::timestamptz IS NULL OR $2::timestamptz IS NULL
                   OR (CASE WHEN $3::varchar = 'operation'
                       THEN EXISTS (SELECT 1 FROM booking_tours bt2
                                    WHERE bt2.booking_id = b.id AND bt2.date BETWEEN $1 AND $2)
                       ELSE b.created_at BETWEEN $1 AND $2 END))
              AND ($4::uuid IS NULL OR EXISTS (SELECT 1 FROM booking_tours bt3
                                               WHERE bt3.booking_id = b.id AND bt3.tour_id = $4))
              AND ($5::varchar IS NULL OR u.full_name = $5)
              AND ($6::varchar IS NULL OR c.external_agency = $6)
              AND ($7::varchar IS NULL OR c.status = $7)
              AND ($8::varchar IS NULL
                   OR cu.name ILIKE '%' || $8 || '%'
                   OR c.booking_id::text ILIKE '%' || $8 || '%'
                   OR EXISTS (SELECT 1 FROM booking_tours bt4
                              JOIN tours t4 ON t4.id = bt4.tour_id
                              WHERE bt4.booking_id = b.id AND t4.name ILIKE '%' || $8 || '%'))
              AND ($9::boolean IS NULL OR c.is_closed = $9)
              AND ($10::varchar IS NULL
                   OR CASE WHEN $10 = 'salesperson' THEN c.salesperson_id IS NOT NULL
                           WHEN $10 = 'agency' THEN c.external_agency IS NOT NULL AND c.external_agency <> ''
                           ELSE TRUE END)
              AND ($11::varchar IS NULL OR b.status = $11)
            ORDER BY b.created_at DESC
            "#,
        )
        .bind(filters.start_date)
        .bind(filters.end_date)
        .bind(filters.date_kind.as_str())
        .bind(filters.tour_id)
        .bind(filters.salesperson.as_deref())
        .bind(filters.external_agency.as_deref())
        .bind(filters.status.as_deref())
        .bind(filters.search.as_deref())
        .bind(filters.is_closed)
        .bind(filters.recipient_type.as_deref())
        .bind(filters.reservation_status.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list commissions: {}", e)))?;

        timer.observe_duration();

        Ok(rows)
    }

    /// Aggregate totals over the same filtered set as `list_commissions`.
    #[instrument(skip(self, filters))]
    pub async fn commission_summary(
        &self,
        filters: &CommissionFilters,
    ) -> Result<CommissionSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commission_summary"])
            .start_timer();

        let summary = sqlx::query_as::<_, CommissionSummary>(
            r#"
            SELECT COALESCE(SUM(c.gross_total), 0) AS total_sales,
                   COALESCE(SUM(c.costs), 0) AS total_costs,
                   COALESCE(SUM(c.net_received), 0) AS total_net,
                   COALESCE(SUM(c.commission_amount), 0) AS total_commissions,
                   COALESCE(SUM(c.commission_amount) FILTER (WHERE c.status = 'pending'), 0) AS pending_commissions,
                   COALESCE(SUM(c.commission_amount) FILTER (WHERE c.status = 'paid'), 0) AS paid_commissions,
                   COALESCE(AVG(c.commission_percentage), 0) AS average_commission_rate,
                   COUNT(*) AS reservation_count
            FROM commissions c
            JOIN bookings b ON b.id = c.booking_id
            JOIN customers cu ON cu.id = b.customer_id
            LEFT JOIN users u ON u.id = c.salesperson_id
            WHERE ($1::timestamptz IS NULL OR $2::timestamptz IS NULL
                   OR (CASE WHEN $3::varchar = 'operation'
                       THEN EXISTS (SELECT 1 FROM booking_tours bt2
                                    WHERE bt2.booking_id = b.id AND bt2.date BETWEEN $1 AND $2)
                       ELSE b.created_at BETWEEN $1 AND $2 END))
              AND ($4::uuid IS NULL OR EXISTS (SELECT 1 FROM booking_tours bt3
                                               WHERE bt3.booking_id = b.id AND bt3.tour_id = $4))
              AND ($5::varchar IS NULL OR u.full_name = $5)
              AND ($6::varchar IS NULL OR c.external_agency = $6)
              AND ($7::varchar IS NULL OR c.status = $7)
              AND ($8::varchar IS NULL
                   OR cu.name ILIKE '%' || $8 || '%'
                   OR c.booking_id::text ILIKE '%' || $8 || '%'
                   OR EXISTS (SELECT 1 FROM booking_tours bt4
                              JOIN tours t4 ON t4.id = bt4.tour_id
                              WHERE bt4.booking_id = b.id AND t4.name ILIKE '%' || $8 || '%'))
              AND ($9::boolean IS NULL OR c.is_closed = $9)
              AND ($10::varchar IS NULL
                   OR CASE WHEN $10 = 'salesperson' THEN c.salesperson_id IS NOT NULL
                           WHEN $10 = 'agency' THEN c.external_agency IS NOT NULL AND c.external_agency <> ''
                           ELSE TRUE END)
              AND ($11::varchar IS NULL OR b.status = $11)
            "#,
        )
        .bind(filters.start_date)
        .bind(filters.end_date)
        .bind(filters.date_kind.as_str())
        .bind(filters.tour_id)
        .bind(filters.salesperson.as_deref())
        .bind(filters.external_agency.as_deref())
        .bind(filters.status.as_deref())
        .bind(filters.search.as_deref())
        .bind(filters.is_closed)
        .bind(filters.recipient_type.as_deref())
        .bind(filters.reservation_status.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute commission summary: {}", e))
        })?;

        timer.observe_duration();

        Ok(summary)
    }

    /// Distinct salespersons, agencies and tours seen in the ledger.
    #[instrument(skip(self))]
    pub async fn commission_unique_values(&self) -> Result<CommissionUniqueValues, AppError> {
        let salespersons = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT u.full_name
            FROM commissions c
            JOIN users u ON u.id = c.salesperson_id
            ORDER BY u.full_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list salespersons: {}", e)))?;

        let agencies = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT c.external_agency
            FROM commissions c
            WHERE c.external_agency IS NOT NULL AND c.external_agency <> ''
            ORDER BY c.external_agency
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list agencies: {}", e)))?;

        let tours = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT DISTINCT t.id, t.name
            FROM commissions c
            JOIN booking_tours bt ON bt.booking_id = c.booking_id
            JOIN tours t ON t.id = bt.tour_id
            ORDER BY t.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list tours: {}", e)))?
        .into_iter()
        .map(|(id, name)| TourOption {
            id: id.to_string(),
            name,
        })
        .collect();

        Ok(CommissionUniqueValues {
            salespersons,
            agencies,
            tours,
        })
    }

    /// Partially update a commission. Status changes must follow the
    /// commission lifecycle; rate and amount edits are rejected once the
    /// row is closed.
    #[instrument(skip(self, update), fields(commission_id = %commission_id))]
    pub async fn update_commission(
        &self,
        commission_id: Uuid,
        update: &UpdateCommissionRequest,
    ) -> Result<Commission, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_commission"])
            .start_timer();

        let current = self.get_commission(commission_id).await?;

        let mut new_status: Option<&'static str> = None;
        if let Some(requested) = update.status.as_deref() {
            let target = CommissionStatus::parse(requested).ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Unknown commission status '{}'", requested))
            })?;
            if target.as_str() != current.status {
                let from = current.parsed_status().ok_or_else(|| {
                    AppError::InternalError(anyhow::anyhow!(
                        "Commission {} has unrecognized status '{}'",
                        commission_id,
                        current.status
                    ))
                })?;
                if !from.can_transition_to(target) {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Cannot move commission from '{}' to '{}'",
                        current.status,
                        target
                    )));
                }
                new_status = Some(target.as_str());
            }
        }

        if (update.commission_percentage.is_some() || update.commission_amount.is_some())
            && current.is_closed
        {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Closed commissions can only change through a closing adjustment"
            )));
        }

        let mut new_amount = update.commission_amount;
        if new_amount.is_none() {
            if let Some(percentage) = update.commission_percentage {
                new_amount = Some(compute_commission_amount(current.net_received, percentage));
            }
        }

        // Marking a commission paid stamps the payment date if none given.
        let mut payment_date = update.payment_date;
        if new_status == Some("paid") && payment_date.is_none() && current.payment_date.is_none() {
            payment_date = Some(Utc::now());
        }

        let commission = sqlx::query_as::<_, Commission>(
            r#"
            UPDATE commissions
            SET status = COALESCE($2, status),
                payment_date = COALESCE($3, payment_date),
                notes = COALESCE($4, notes),
                commission_percentage = COALESCE($5, commission_percentage),
                commission_amount = COALESCE($6, commission_amount),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, booking_id, salesperson_id, external_agency, gross_total, costs,
                      net_received, commission_percentage, commission_amount, currency, status,
                      payment_date, notes, is_closed, closed_at, closed_by, closing_id,
                      invoice_number, created_by, created_at, updated_at
            "#,
        )
        .bind(commission_id)
        .bind(new_status)
        .bind(payment_date)
        .bind(update.notes.as_deref())
        .bind(update.commission_percentage)
        .bind(new_amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update commission: {}", e))
        })?;

        timer.observe_duration();

        info!(commission_id = %commission_id, "Commission updated");

        Ok(commission)
    }

    // -------------------------------------------------------------------------
    // Operator Payment Operations
    // -------------------------------------------------------------------------

    /// Get an operator payment by ID.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn get_operator_payment(&self, payment_id: Uuid) -> Result<OperatorPayment, AppError> {
        let payment = sqlx::query_as::<_, OperatorPayment>(
            r#"
            SELECT id, booking_tour_id, operator_name, operation_type, cost_amount, currency,
                   logistic_status, status, is_closed, closed_at, closed_by, closing_id,
                   invoice_number, created_by, created_at, updated_at
            FROM operator_payments
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get operator payment: {}", e))
        })?;

        payment.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Operator payment not found")))
    }

    /// List operator payments with tour and booking context, newest tour
    /// date first.
    #[instrument(skip(self, filters))]
    pub async fn list_operator_payments(
        &self,
        filters: &OperatorFilters,
    ) -> Result<Vec<OperatorPaymentListRow>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_operator_payments"])
            .start_timer();

        let rows = sqlx::query_as::<_, OperatorPaymentListRow>(
            r#"
            SELECT op.id, op.booking_tour_id, op.operator_name, op.operation_type,
                   op.cost_amount, op.currency, op.logistic_status, op.status, op.is_closed,
                   op.closed_at, op.closing_id, op.invoice_number, op.created_at,
                   bt.booking_id,
                   t.name AS tour_name,
                   bt.date AS tour_date,
                   bt.subtotal AS tour_subtotal,
                   cu.name AS customer_name
            FROM operator_payments op
            JOIN booking_tours bt ON bt.id = op.booking_tour_id
            JOIN tours t ON t.id = bt.tour_id
            JOIN bookings b ON b.id = bt.booking_id
            JOIN customers cu ON cu.id = b.customer_id
            WHERE ($1::timestamptz IS NULL OR $2::timestamptz IS NULL OR bt.date BETWEEN $1 AND $2)
              AND ($3::varchar IS NULL OR op.operator_name = $3)
              AND ($4::varchar IS NULL OR op.logistic_status = $4)
              AND ($5::varchar IS NULL OR op.status = $5)
              AND ($6::boolean IS NULL OR op.is_closed = $6)
              AND ($7::varchar IS NULL
                   OR op.operator_name ILIKE '%' || $7 || '%'
                   OR t.name ILIKE '%' || $7 || '%'
                   OR cu.name ILIKE '%' || $7 || '%')
            ORDER BY bt.date DESC
            "#,
        )
        .bind(filters.start_date)
        .bind(filters.end_date)
        .bind(filters.operator.as_deref())
        .bind(filters.logistic_status.as_deref())
        .bind(filters.status.as_deref())
        .bind(filters.is_closed)
        .bind(filters.search.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list operator payments: {}", e))
        })?;

        timer.observe_duration();

        Ok(rows)
    }

    /// Aggregate totals over the same filtered set as
    /// `list_operator_payments`.
    #[instrument(skip(self, filters))]
    pub async fn operator_summary(
        &self,
        filters: &OperatorFilters,
    ) -> Result<OperatorSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["operator_summary"])
            .start_timer();

        let summary = sqlx::query_as::<_, OperatorSummary>(
            r#"
            SELECT COALESCE(SUM(op.cost_amount), 0) AS total_costs,
                   COALESCE(SUM(op.cost_amount) FILTER (WHERE op.status = 'pending'), 0) AS pending_costs,
                   COALESCE(SUM(op.cost_amount) FILTER (WHERE op.status = 'paid'), 0) AS paid_costs,
                   COUNT(*) AS payment_count,
                   COUNT(*) FILTER (WHERE op.logistic_status <> 'pending' AND NOT op.is_closed) AS closable_count
            FROM operator_payments op
            JOIN booking_tours bt ON bt.id = op.booking_tour_id
            JOIN tours t ON t.id = bt.tour_id
            JOIN bookings b ON b.id = bt.booking_id
            JOIN customers cu ON cu.id = b.customer_id
            WHERE ($1::timestamptz IS NULL OR $2::timestamptz IS NULL OR bt.date BETWEEN $1 AND $2)
              AND ($3::varchar IS NULL OR op.operator_name = $3)
              AND ($4::varchar IS NULL OR op.logistic_status = $4)
              AND ($5::varchar IS NULL OR op.status = $5)
              AND ($6::boolean IS NULL OR op.is_closed = $6)
              AND ($7::varchar IS NULL
                   OR op.operator_name ILIKE '%' || $7 || '%'
                   OR t.name ILIKE '%' || $7 || '%'
                   OR cu.name ILIKE '%' || $7 || '%')
            "#,
        )
        .bind(filters.start_date)
        .bind(filters.end_date)
        .bind(filters.operator.as_deref())
        .bind(filters.logistic_status.as_deref())
        .bind(filters.status.as_deref())
        .bind(filters.is_closed)
        .bind(filters.search.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute operator summary: {}", e))
        })?;

        timer.observe_duration();

        Ok(summary)
    }

    /// Distinct operator names and status values seen in the ledger.
    #[instrument(skip(self))]
    pub async fn operator_unique_values(&self) -> Result<OperatorUniqueValues, AppError> {
        let operators = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT operator_name FROM operator_payments ORDER BY operator_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list operators: {}", e)))?;

        let logistic_statuses = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT logistic_status FROM operator_payments ORDER BY logistic_status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list logistic statuses: {}", e))
        })?;

        let payment_statuses = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT status FROM operator_payments ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list payment statuses: {}", e))
        })?;

        Ok(OperatorUniqueValues {
            operators,
            logistic_statuses,
            payment_statuses,
        })
    }

    /// Partially update an operator payment's status fields.
    #[instrument(skip(self, update), fields(payment_id = %payment_id))]
    pub async fn update_operator_payment(
        &self,
        payment_id: Uuid,
        update: &UpdateOperatorPaymentRequest,
    ) -> Result<OperatorPayment, AppError> {
        if let Some(status) = update.status.as_deref() {
            if CommissionStatus::parse(status).is_none() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Unknown payment status '{}'",
                    status
                )));
            }
        }
        if let Some(logistic) = update.logistic_status.as_deref() {
            if LogisticStatus::parse(logistic).is_none() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Unknown logistic status '{}'",
                    logistic
                )));
            }
        }

        let payment = sqlx::query_as::<_, OperatorPayment>(
            r#"
            UPDATE operator_payments
            SET status = COALESCE($2, status),
                logistic_status = COALESCE($3, logistic_status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, booking_tour_id, operator_name, operation_type, cost_amount, currency,
                      logistic_status, status, is_closed, closed_at, closed_by, closing_id,
                      invoice_number, created_by, created_at, updated_at
            "#,
        )
        .bind(payment_id)
        .bind(update.status.as_deref())
        .bind(update.logistic_status.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update operator payment: {}", e))
        })?;

        payment.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Operator payment not found")))
    }

    // -------------------------------------------------------------------------
    // Closing Operations (reads; the engine owns the writes)
    // -------------------------------------------------------------------------

    /// List closings, newest first.
    #[instrument(skip(self, filters))]
    pub async fn list_closings(
        &self,
        filters: &ClosingFilters,
    ) -> Result<Vec<CommissionClosing>, AppError> {
        let closings = sqlx::query_as::<_, CommissionClosing>(
            r#"
            SELECT id, closing_type, recipient_name, recipient_id, period_start, period_end,
                   total_amount, currency, item_count, invoice_number, invoice_file, expense_id,
                   is_active, undone_at, undone_by, undo_reason, created_by, created_at
            FROM commission_closings
            WHERE ($1::varchar IS NULL OR closing_type = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filters.closing_type.as_deref())
        .bind(filters.is_active)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list closings: {}", e)))?;

        Ok(closings)
    }

    /// Get a closing by ID.
    #[instrument(skip(self), fields(closing_id = %closing_id))]
    pub async fn get_closing(&self, closing_id: Uuid) -> Result<CommissionClosing, AppError> {
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
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get closing: {}", e)))?;

        closing.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Closing not found")))
    }

    /// Commissions belonging to a closing.
    #[instrument(skip(self), fields(closing_id = %closing_id))]
    pub async fn closing_commissions(&self, closing_id: Uuid) -> Result<Vec<Commission>, AppError> {
        sqlx::query_as::<_, Commission>(
            r#"
            SELECT id, booking_id, salesperson_id, external_agency, gross_total, costs,
                   net_received, commission_percentage, commission_amount, currency, status,
                   payment_date, notes, is_closed, closed_at, closed_by, closing_id,
                   invoice_number, created_by, created_at, updated_at
            FROM commissions
            WHERE closing_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(closing_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list closing commissions: {}", e))
        })
    }

    /// Operator payments belonging to a closing.
    #[instrument(skip(self), fields(closing_id = %closing_id))]
    pub async fn closing_operator_payments(
        &self,
        closing_id: Uuid,
    ) -> Result<Vec<OperatorPayment>, AppError> {
        sqlx::query_as::<_, OperatorPayment>(
            r#"
            SELECT id, booking_tour_id, operator_name, operation_type, cost_amount, currency,
                   logistic_status, status, is_closed, closed_at, closed_by, closing_id,
                   invoice_number, created_by, created_at, updated_at
            FROM operator_payments
            WHERE closing_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(closing_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to list closing operator payments: {}",
                e
            ))
        })
    }

    /// Audit rows recorded against a closing, oldest first.
    #[instrument(skip(self), fields(closing_id = %closing_id))]
    pub async fn closing_audit_log(
        &self,
        closing_id: Uuid,
    ) -> Result<Vec<CommissionAuditLog>, AppError> {
        sqlx::query_as::<_, CommissionAuditLog>(
            r#"
            SELECT id, entity_type, entity_id, action, performed_by, booking_id, old_value,
                   new_value, reason, closing_id, ip_address, user_agent, created_at
            FROM commission_audit_log
            WHERE closing_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(closing_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list audit log: {}", e)))
    }

    // -------------------------------------------------------------------------
    // Expense Operations
    // -------------------------------------------------------------------------

    /// Create an expense.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_expense(
        &self,
        input: &CreateExpenseRequest,
        created_by: Option<Uuid>,
    ) -> Result<Expense, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_expense"])
            .start_timer();

        let expense = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (name, expense_type, category, description, amount, currency,
                                  payment_status, payment_method, payment_date, due_date,
                                  recurrence, recurrence_end_date, vendor, invoice_number,
                                  notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id, name, expense_type, category, description, amount, currency,
                      payment_status, payment_method, payment_date, due_date, recurrence,
                      recurrence_end_date, vendor, invoice_number, notes, created_by,
                      created_at, updated_at
            "#,
        )
        .bind(&input.name)
        .bind(input.expense_type.as_deref().unwrap_or("variable"))
        .bind(input.category.as_deref().unwrap_or("other"))
        .bind(input.description.as_deref())
        .bind(input.amount)
        .bind(input.currency.as_deref().unwrap_or("CLP"))
        .bind(input.payment_status.as_deref().unwrap_or("pending"))
        .bind(input.payment_method.as_deref())
        .bind(input.payment_date)
        .bind(input.due_date)
        .bind(input.recurrence.as_deref().unwrap_or("once"))
        .bind(input.recurrence_end_date)
        .bind(input.vendor.as_deref())
        .bind(input.invoice_number.as_deref())
        .bind(input.notes.as_deref())
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create expense: {}", e)))?;

        timer.observe_duration();

        info!(expense_id = %expense.id, "Expense created");

        Ok(expense)
    }

    /// Get an expense by ID.
    #[instrument(skip(self), fields(expense_id = %expense_id))]
    pub async fn get_expense(&self, expense_id: Uuid) -> Result<Expense, AppError> {
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, name, expense_type, category, description, amount, currency,
                   payment_status, payment_method, payment_date, due_date, recurrence,
                   recurrence_end_date, vendor, invoice_number, notes, created_by,
                   created_at, updated_at
            FROM expenses
            WHERE id = $1
            "#,
        )
        .bind(expense_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get expense: {}", e)))?;

        expense.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Expense not found")))
    }

    /// List expenses, soonest-overdue first. The due date range applies
    /// only when both ends are present.
    #[instrument(skip(self, filters))]
    pub async fn list_expenses(&self, filters: &ExpenseFilters) -> Result<Vec<Expense>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_expenses"])
            .start_timer();

        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, name, expense_type, category, description, amount, currency,
                   payment_status, payment_method, payment_date, due_date, recurrence,
                   recurrence_end_date, vendor, invoice_number, notes, created_by,
                   created_at, updated_at
            FROM expenses
            WHERE ($1::varchar IS NULL OR expense_type = $1)
              AND ($2::varchar IS NULL OR category = $2)
              AND ($3::varchar IS NULL OR payment_status = $3)
              AND ($4::date IS NULL OR $5::date IS NULL OR due_date BETWEEN $4 AND $5)
              AND ($6::varchar IS NULL
                   OR name ILIKE '%' || $6 || '%'
                   OR description ILIKE '%' || $6 || '%'
                   OR vendor ILIKE '%' || $6 || '%'
                   OR invoice_number ILIKE '%' || $6 || '%')
            ORDER BY due_date DESC
            "#,
        )
        .bind(filters.expense_type.as_deref())
        .bind(filters.category.as_deref())
        .bind(filters.payment_status.as_deref())
        .bind(filters.start_date)
        .bind(filters.end_date)
        .bind(filters.search.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list expenses: {}", e)))?;

        timer.observe_duration();

        Ok(expenses)
    }

    /// Partially update an expense.
    #[instrument(skip(self, update), fields(expense_id = %expense_id))]
    pub async fn update_expense(
        &self,
        expense_id: Uuid,
        update: &UpdateExpenseRequest,
    ) -> Result<Expense, AppError> {
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            UPDATE expenses
            SET name = COALESCE($2, name),
                expense_type = COALESCE($3, expense_type),
                category = COALESCE($4, category),
                description = COALESCE($5, description),
                amount = COALESCE($6, amount),
                currency = COALESCE($7, currency),
                payment_status = COALESCE($8, payment_status),
                payment_method = COALESCE($9, payment_method),
                payment_date = COALESCE($10, payment_date),
                due_date = COALESCE($11, due_date),
                recurrence = COALESCE($12, recurrence),
                recurrence_end_date = COALESCE($13, recurrence_end_date),
                vendor = COALESCE($14, vendor),
                invoice_number = COALESCE($15, invoice_number),
                notes = COALESCE($16, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, expense_type, category, description, amount, currency,
                      payment_status, payment_method, payment_date, due_date, recurrence,
                      recurrence_end_date, vendor, invoice_number, notes, created_by,
                      created_at, updated_at
            "#,
        )
        .bind(expense_id)
        .bind(update.name.as_deref())
        .bind(update.expense_type.as_deref())
        .bind(update.category.as_deref())
        .bind(update.description.as_deref())
        .bind(update.amount)
        .bind(update.currency.as_deref())
        .bind(update.payment_status.as_deref())
        .bind(update.payment_method.as_deref())
        .bind(update.payment_date)
        .bind(update.due_date)
        .bind(update.recurrence.as_deref())
        .bind(update.recurrence_end_date)
        .bind(update.vendor.as_deref())
        .bind(update.invoice_number.as_deref())
        .bind(update.notes.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update expense: {}", e)))?;

        expense.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Expense not found")))
    }

    /// Delete an expense.
    #[instrument(skip(self), fields(expense_id = %expense_id))]
    pub async fn delete_expense(&self, expense_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(expense_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete expense: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Expense not found")));
        }

        info!(expense_id = %expense_id, "Expense deleted");

        Ok(())
    }

    /// Aggregates for the expense dashboard card. Cancelled expenses are
    /// left out; pending rows past their due date count as overdue.
    #[instrument(skip(self))]
    pub async fn expense_summary(&self) -> Result<ExpenseSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["expense_summary"])
            .start_timer();

        let totals = sqlx::query_as::<_, (Decimal, Decimal, Decimal, Decimal, Decimal)>(
            r#"
            SELECT COALESCE(SUM(amount) FILTER (WHERE payment_status = 'pending'), 0),
                   COALESCE(SUM(amount) FILTER (WHERE payment_status = 'paid'), 0),
                   COALESCE(SUM(amount) FILTER (WHERE payment_status = 'overdue'
                            OR (payment_status = 'pending' AND due_date < CURRENT_DATE)), 0),
                   COALESCE(SUM(amount) FILTER (WHERE expense_type = 'fixed'), 0),
                   COALESCE(SUM(amount) FILTER (WHERE expense_type = 'variable'), 0)
            FROM expenses
            WHERE payment_status <> 'cancelled'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute expense summary: {}", e))
        })?;

        let by_category = sqlx::query_as::<_, CategoryBreakdown>(
            r#"
            SELECT category, COALESCE(SUM(amount), 0) AS total, COUNT(*) AS count
            FROM expenses
            WHERE payment_status <> 'cancelled'
            GROUP BY category
            ORDER BY total DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to compute category totals: {}", e))
        })?;

        timer.observe_duration();

        Ok(ExpenseSummary {
            total_pending: totals.0,
            total_paid: totals.1,
            total_overdue: totals.2,
            fixed_expenses: totals.3,
            variable_expenses: totals.4,
            by_category,
        })
    }

    // -------------------------------------------------------------------------
    // Financial Account Operations
    // -------------------------------------------------------------------------

    /// Create a payment account. The current balance starts at the
    /// initial balance.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_account(
        &self,
        input: &CreateAccountRequest,
        created_by: Option<Uuid>,
    ) -> Result<FinancialAccount, AppError> {
        let initial = input.initial_balance.unwrap_or(Decimal::ZERO);
        let account = sqlx::query_as::<_, FinancialAccount>(
            r#"
            INSERT INTO financial_accounts (name, account_type, bank_name, account_number,
                                            currency, initial_balance, current_balance, notes,
                                            created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7, $8)
            RETURNING id, name, account_type, bank_name, account_number, currency,
                      initial_balance, current_balance, is_active, notes, created_by,
                      created_at, updated_at
            "#,
        )
        .bind(&input.name)
        .bind(input.account_type.as_deref().unwrap_or("checking"))
        .bind(input.bank_name.as_deref())
        .bind(input.account_number.as_deref())
        .bind(input.currency.as_deref().unwrap_or("CLP"))
        .bind(initial)
        .bind(input.notes.as_deref())
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create account: {}", e)))?;

        info!(account_id = %account.id, "Financial account created");

        Ok(account)
    }

    /// Get a payment account by ID.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn get_account(&self, account_id: Uuid) -> Result<FinancialAccount, AppError> {
        let account = sqlx::query_as::<_, FinancialAccount>(
            r#"
            SELECT id, name, account_type, bank_name, account_number, currency,
                   initial_balance, current_balance, is_active, notes, created_by,
                   created_at, updated_at
            FROM financial_accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e)))?;

        account.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))
    }

    /// List payment accounts ordered by name.
    #[instrument(skip(self, filters))]
    pub async fn list_accounts(
        &self,
        filters: &AccountFilters,
    ) -> Result<Vec<FinancialAccount>, AppError> {
        sqlx::query_as::<_, FinancialAccount>(
            r#"
            SELECT id, name, account_type, bank_name, account_number, currency,
                   initial_balance, current_balance, is_active, notes, created_by,
                   created_at, updated_at
            FROM financial_accounts
            WHERE ($1::boolean IS NULL OR is_active = $1)
              AND ($2::varchar IS NULL OR currency = $2)
            ORDER BY name
            "#,
        )
        .bind(filters.is_active)
        .bind(filters.currency.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list accounts: {}", e)))
    }

    /// Partially update a payment account.
    #[instrument(skip(self, update), fields(account_id = %account_id))]
    pub async fn update_account(
        &self,
        account_id: Uuid,
        update: &UpdateAccountRequest,
    ) -> Result<FinancialAccount, AppError> {
        let account = sqlx::query_as::<_, FinancialAccount>(
            r#"
            UPDATE financial_accounts
            SET name = COALESCE($2, name),
                account_type = COALESCE($3, account_type),
                bank_name = COALESCE($4, bank_name),
                account_number = COALESCE($5, account_number),
                currency = COALESCE($6, currency),
                is_active = COALESCE($7, is_active),
                notes = COALESCE($8, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, account_type, bank_name, account_number, currency,
                      initial_balance, current_balance, is_active, notes, created_by,
                      created_at, updated_at
            "#,
        )
        .bind(account_id)
        .bind(update.name.as_deref())
        .bind(update.account_type.as_deref())
        .bind(update.bank_name.as_deref())
        .bind(update.account_number.as_deref())
        .bind(update.currency.as_deref())
        .bind(update.is_active)
        .bind(update.notes.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update account: {}", e)))?;

        account.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Account not found")))
    }

    /// Delete a payment account.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn delete_account(&self, account_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM financial_accounts WHERE id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete account: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Account not found")));
        }

        info!(account_id = %account_id, "Financial account deleted");

        Ok(())
    }

    /// Record a completed transfer and move both balances in one
    /// transaction. `amount_in` is the credited amount, already converted
    /// to the destination account's currency.
    #[instrument(skip(self, input), fields(from = %input.from_account_id, to = %input.to_account_id))]
    pub async fn create_transfer(
        &self,
        input: &CreateTransferRequest,
        currency: &str,
        amount_in: Decimal,
        created_by: Option<Uuid>,
    ) -> Result<BankTransfer, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_transfer"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let transfer = sqlx::query_as::<_, BankTransfer>(
            r#"
            INSERT INTO bank_transfers (from_account_id, to_account_id, amount, currency,
                                        transfer_date, status, reference, created_by)
            VALUES ($1, $2, $3, $4, $5, 'completed', $6, $7)
            RETURNING id, from_account_id, to_account_id, amount, currency, transfer_date,
                      status, reference, created_by, created_at
            "#,
        )
        .bind(input.from_account_id)
        .bind(input.to_account_id)
        .bind(input.amount)
        .bind(currency)
        .bind(input.transfer_date)
        .bind(input.reference.as_deref())
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create transfer: {}", e)))?;

        let debited = sqlx::query(
            r#"
            UPDATE financial_accounts
            SET current_balance = current_balance - $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(input.from_account_id)
        .bind(input.amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to debit account: {}", e)))?;

        if debited.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!("Source account not found")));
        }

        let credited = sqlx::query(
            r#"
            UPDATE financial_accounts
            SET current_balance = current_balance + $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(input.to_account_id)
        .bind(amount_in)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to credit account: {}", e)))?;

        if credited.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Destination account not found"
            )));
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transfer: {}", e))
        })?;

        timer.observe_duration();

        info!(transfer_id = %transfer.id, "Bank transfer recorded");

        Ok(transfer)
    }

    /// List transfers, newest first.
    #[instrument(skip(self))]
    pub async fn list_transfers(&self) -> Result<Vec<BankTransfer>, AppError> {
        sqlx::query_as::<_, BankTransfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, currency, transfer_date,
                   status, reference, created_by, created_at
            FROM bank_transfers
            ORDER BY transfer_date DESC, created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list transfers: {}", e)))
    }

    // -------------------------------------------------------------------------
    // Exchange Rates
    // -------------------------------------------------------------------------

    /// Stored rate for a currency pair, if one has been loaded.
    #[instrument(skip(self))]
    pub async fn get_exchange_rate(
        &self,
        from_currency: &str,
        to_currency: &str,
    ) -> Result<Option<Decimal>, AppError> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT rate FROM exchange_rates WHERE from_currency = $1 AND to_currency = $2",
        )
        .bind(from_currency)
        .bind(to_currency)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to look up exchange rate: {}", e))
        })
    }
}
