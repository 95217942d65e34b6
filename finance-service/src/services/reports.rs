//! Read-time financial reports. Nothing here persists state: every
//! report is assembled from the ledgers, expenses, payments and accounts
//! at request time, with all monetary figures converted into the
//! requested currency before aggregation.
//!
//! Amounts are summed per source currency in SQL and converted once per
//! group, so a report over mixed-currency data stays exact to the rates
//! in use at request time.

use crate::models::report::{
    AlertBucket, BankStatementQuery, BankStatementResponse, CashFlowPeriod, CashFlowQuery,
    CashFlowResponse, CashFlowSummary, DashboardAlerts, DashboardMetrics, DashboardQuery,
    DashboardResponse, DateRangeQuery, IncomeFigures, IncomePeriod, IncomeStatementQuery,
    IncomeStatementResponse, MonthlyTrend, PayableCommission, PayableExpense, PayablesResponse,
    ReceivableItem, StatementAccount, StatementLine, StatementTotals, YoyMetric,
};
use crate::services::currency::CurrencyService;
use crate::services::database::Database;
use crate::services::metrics::REPORT_DURATION;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{instrument, warn};
use uuid::Uuid;

const DEFAULT_REPORT_CURRENCY: &str = "CLP";
const ALERT_WINDOW_DAYS: i64 = 7;
const TREND_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Annual,
}

impl PeriodType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(PeriodType::Daily),
            "weekly" => Some(PeriodType::Weekly),
            "monthly" => Some(PeriodType::Monthly),
            "annual" => Some(PeriodType::Annual),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
            PeriodType::Annual => "annual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Basis {
    Cash,
    Accrual,
}

impl Basis {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "cash" => Some(Basis::Cash),
            "accrual" => Some(Basis::Accrual),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Basis::Cash => "cash",
            Basis::Accrual => "accrual",
        }
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).expect("valid time").and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59).expect("valid time").and_utc()
}

fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = (date.year(), date.month());
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next_month.and_then(|d| d.pred_opt()).expect("valid date")
}

/// First day of the month `months_back` months before `date`'s month.
fn month_start_back(date: NaiveDate, months_back: u32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 - months_back as i32;
    let year = total.div_euclid(12);
    let month0 = total.rem_euclid(12) as u32;
    NaiveDate::from_ymd_opt(year, month0 + 1, 1).expect("valid date")
}

fn one_year_before(date: NaiveDate) -> NaiveDate {
    // Feb 29 has no counterpart in the prior year.
    date.with_year(date.year() - 1).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(date.year() - 1, 2, 28).unwrap_or(date)
    })
}

/// Split an inclusive date range into calendar-aligned buckets. The
/// first and last buckets are clamped to the range bounds.
fn period_bounds(period_type: PeriodType, start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut bounds = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let bucket_end = match period_type {
            PeriodType::Daily => cursor,
            PeriodType::Weekly => {
                cursor + Duration::days(6 - cursor.weekday().num_days_from_monday() as i64)
            }
            PeriodType::Monthly => month_end(cursor),
            PeriodType::Annual => {
                NaiveDate::from_ymd_opt(cursor.year(), 12, 31).expect("valid date")
            }
        };
        let clamped = bucket_end.min(end);
        bounds.push((cursor, clamped));
        cursor = clamped + Duration::days(1);
    }
    bounds
}

fn period_label(period_type: PeriodType, start: NaiveDate) -> String {
    match period_type {
        PeriodType::Daily => start.format("%Y-%m-%d").to_string(),
        PeriodType::Weekly => {
            let week = start.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        PeriodType::Monthly => start.format("%Y-%m").to_string(),
        PeriodType::Annual => start.format("%Y").to_string(),
    }
}

fn yoy_change(current: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    Some((current - previous) / previous * Decimal::ONE_HUNDRED)
}

fn yoy_decimal(current: Decimal, previous: Decimal) -> YoyMetric<Decimal> {
    YoyMetric {
        yoy_change: yoy_change(current, previous),
        current,
        previous,
    }
}

fn yoy_count(current: i64, previous: i64) -> YoyMetric<i64> {
    YoyMetric {
        yoy_change: yoy_change(Decimal::from(current), Decimal::from(previous)),
        current,
        previous,
    }
}

fn normalize_for_match(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Approximate matching between a payment method string and an account
/// name. Two accounts with similar normalized names can both match the
/// same payment; there is no uniqueness guarantee.
fn method_matches_account(method: &str, account_name: &str) -> bool {
    let method = normalize_for_match(method);
    let account = normalize_for_match(account_name);
    if method.is_empty() || account.is_empty() {
        return false;
    }
    method.contains(&account) || account.contains(&method)
}

fn parse_lenient_date(value: Option<&str>) -> Option<NaiveDate> {
    let raw = value?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warn!(value = raw, "Ignoring unparseable date filter");
            None
        }
    }
}

/// Builds the read-only financial reports.
#[derive(Clone)]
pub struct ReportService {
    db: Database,
    currency: CurrencyService,
}

impl ReportService {
    pub fn new(db: Database, currency: CurrencyService) -> Self {
        Self { db, currency }
    }

    /// Sum per-currency rows into one figure in the target currency.
    async fn convert_sums(
        &self,
        rows: Vec<(String, Decimal)>,
        target: &str,
    ) -> Result<Decimal, AppError> {
        let mut total = Decimal::ZERO;
        for (currency, amount) in rows {
            total += self.currency.convert(amount, &currency, target).await?;
        }
        Ok(total)
    }

    async fn alert_bucket(
        &self,
        rows: Vec<(String, i64, Decimal)>,
        target: &str,
    ) -> Result<AlertBucket, AppError> {
        let mut count = 0;
        let mut amount = Decimal::ZERO;
        for (currency, n, total) in rows {
            count += n;
            amount += self.currency.convert(total, &currency, target).await?;
        }
        Ok(AlertBucket { count, amount })
    }

    // -------------------------------------------------------------------------
    // Dashboard
    // -------------------------------------------------------------------------

    /// Status alerts, year-over-year headline metrics and a twelve-month
    /// trend series. Year-over-year windows run January 1st to "now" and
    /// the same span one year earlier; the change is null when the prior
    /// window has no data.
    #[instrument(skip(self, query))]
    pub async fn dashboard(&self, query: &DashboardQuery) -> Result<DashboardResponse, AppError> {
        let timer = REPORT_DURATION
            .with_label_values(&["dashboard"])
            .start_timer();

        let target = query.currency.as_deref().unwrap_or(DEFAULT_REPORT_CURRENCY);
        let now = Utc::now();
        let today = now.date_naive();

        // ----- Alerts -----

        let overdue_payments = self
            .alert_bucket(
                sqlx::query_as::<_, (String, i64, Decimal)>(
                    r#"
                    SELECT b.currency, COUNT(*), COALESCE(SUM(p.amount_paid), 0)
                    FROM booking_payments p
                    JOIN bookings b ON b.id = p.booking_id
                    WHERE p.status = 'pending' AND p.date < $1
                    GROUP BY b.currency
                    "#,
                )
                .bind(now)
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to load payment alerts: {}", e))
                })?,
                target,
            )
            .await?;

        let upcoming_payments = self
            .alert_bucket(
                sqlx::query_as::<_, (String, i64, Decimal)>(
                    r#"
                    SELECT b.currency, COUNT(*), COALESCE(SUM(p.amount_paid), 0)
                    FROM booking_payments p
                    JOIN bookings b ON b.id = p.booking_id
                    WHERE p.status = 'pending' AND p.date >= $1 AND p.date <= $2
                    GROUP BY b.currency
                    "#,
                )
                .bind(now)
                .bind(now + Duration::days(ALERT_WINDOW_DAYS))
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to load payment alerts: {}", e))
                })?,
                target,
            )
            .await?;

        let overdue_expenses = self
            .alert_bucket(
                sqlx::query_as::<_, (String, i64, Decimal)>(
                    r#"
                    SELECT currency, COUNT(*), COALESCE(SUM(amount), 0)
                    FROM expenses
                    WHERE payment_status = 'overdue'
                       OR (payment_status = 'pending' AND due_date < $1)
                    GROUP BY currency
                    "#,
                )
                .bind(today)
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to load expense alerts: {}", e))
                })?,
                target,
            )
            .await?;

        let upcoming_expenses = self
            .alert_bucket(
                sqlx::query_as::<_, (String, i64, Decimal)>(
                    r#"
                    SELECT currency, COUNT(*), COALESCE(SUM(amount), 0)
                    FROM expenses
                    WHERE payment_status = 'pending' AND due_date >= $1 AND due_date <= $2
                    GROUP BY currency
                    "#,
                )
                .bind(today)
                .bind(today + Duration::days(ALERT_WINDOW_DAYS))
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to load expense alerts: {}", e))
                })?,
                target,
            )
            .await?;

        // ----- Year-over-year metrics -----

        let current_start = day_start(
            NaiveDate::from_ymd_opt(today.year(), 1, 1).expect("valid date"),
        );
        let previous_start = day_start(
            NaiveDate::from_ymd_opt(today.year() - 1, 1, 1).expect("valid date"),
        );
        let previous_end = day_end(one_year_before(today));

        let revenue_current = self
            .revenue_in_window(current_start, now, target)
            .await?;
        let revenue_previous = self
            .revenue_in_window(previous_start, previous_end, target)
            .await?;

        let reservations_current = self.reservations_in_window(current_start, now).await?;
        let reservations_previous = self
            .reservations_in_window(previous_start, previous_end)
            .await?;

        let customers_current = self.customers_in_window(current_start, now).await?;
        let customers_previous = self
            .customers_in_window(previous_start, previous_end)
            .await?;

        let pax_current = self.pax_in_window(current_start, now).await?;
        let pax_previous = self.pax_in_window(previous_start, previous_end).await?;

        let metrics = DashboardMetrics {
            total_revenue: yoy_decimal(revenue_current, revenue_previous),
            active_reservations: yoy_count(reservations_current, reservations_previous),
            total_customers: yoy_count(customers_current, customers_previous),
            ytd_pax: yoy_count(pax_current, pax_previous),
        };

        // ----- Twelve-month trend -----

        let mut monthly_trends = Vec::with_capacity(TREND_MONTHS as usize);
        for offset in (0..TREND_MONTHS).rev() {
            let start = month_start_back(today, offset);
            let end = month_end(start);

            let rows = sqlx::query_as::<_, (String, i64, Decimal, i64)>(
                r#"
                SELECT b.currency,
                       COUNT(DISTINCT b.id),
                       COALESCE(SUM(bt.subtotal), 0),
                       COALESCE(SUM(bt.adult_pax + bt.child_pax + bt.infant_pax), 0)
                FROM bookings b
                LEFT JOIN booking_tours bt ON bt.booking_id = b.id
                WHERE b.created_at >= $1 AND b.created_at <= $2
                GROUP BY b.currency
                "#,
            )
            .bind(day_start(start))
            .bind(day_end(end))
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to load monthly trend: {}", e))
            })?;

            let mut sales = Decimal::ZERO;
            let mut reservations = 0;
            let mut pax = 0;
            for (currency, count, subtotal, month_pax) in rows {
                reservations += count;
                pax += month_pax;
                sales += self.currency.convert(subtotal, &currency, target).await?;
            }

            monthly_trends.push(MonthlyTrend {
                month: start.format("%Y-%m").to_string(),
                sales,
                reservations,
                pax,
            });
        }

        timer.observe_duration();

        Ok(DashboardResponse {
            alerts: DashboardAlerts {
                overdue_payments,
                upcoming_payments,
                overdue_expenses,
                upcoming_expenses,
            },
            metrics,
            monthly_trends,
            currency: target.to_string(),
        })
    }

    async fn revenue_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        target: &str,
    ) -> Result<Decimal, AppError> {
        let rows = sqlx::query_as::<_, (String, Decimal)>(
            r#"
            SELECT b.currency, COALESCE(SUM(p.amount_paid), 0)
            FROM booking_payments p
            JOIN bookings b ON b.id = p.booking_id
            WHERE p.status = 'paid' AND p.date >= $1 AND p.date <= $2
            GROUP BY b.currency
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load revenue: {}", e)))?;

        self.convert_sums(rows, target).await
    }

    async fn reservations_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM bookings
            WHERE created_at >= $1 AND created_at <= $2 AND status <> 'cancelled'
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count bookings: {}", e)))
    }

    async fn customers_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM customers WHERE created_at >= $1 AND created_at <= $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count customers: {}", e)))
    }

    async fn pax_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(adult_pax + child_pax + infant_pax), 0)
            FROM booking_tours
            WHERE date >= $1 AND date <= $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to total pax: {}", e)))
    }

    // -------------------------------------------------------------------------
    // Income Statement
    // -------------------------------------------------------------------------

    /// Profit and loss over a date range, bucketed monthly or annually,
    /// on a cash or accrual basis.
    #[instrument(skip(self, query))]
    pub async fn income_statement(
        &self,
        query: &IncomeStatementQuery,
    ) -> Result<IncomeStatementResponse, AppError> {
        let timer = REPORT_DURATION
            .with_label_values(&["income_statement"])
            .start_timer();

        if query.end_date < query.start_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "endDate is before startDate"
            )));
        }

        let period_type = match query.period_type.as_deref() {
            None => PeriodType::Monthly,
            Some(raw) => match PeriodType::parse(raw) {
                Some(p @ (PeriodType::Monthly | PeriodType::Annual)) => p,
                _ => {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "periodType must be 'monthly' or 'annual'"
                    )))
                }
            },
        };
        let basis = match query.basis.as_deref() {
            None => Basis::Accrual,
            Some(raw) => Basis::parse(raw).ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("basis must be 'cash' or 'accrual'"))
            })?,
        };
        let target = query.currency.as_deref().unwrap_or(DEFAULT_REPORT_CURRENCY);

        let mut periods = Vec::new();
        for (start, end) in period_bounds(period_type, query.start_date, query.end_date) {
            let figures = self.income_figures(start, end, basis, target).await?;
            periods.push(IncomePeriod {
                period: period_label(period_type, start),
                start_date: start,
                end_date: end,
                figures,
            });
        }

        let totals = self
            .income_figures(query.start_date, query.end_date, basis, target)
            .await?;

        timer.observe_duration();

        Ok(IncomeStatementResponse {
            period_type: period_type.as_str().to_string(),
            basis: basis.as_str().to_string(),
            currency: target.to_string(),
            start_date: query.start_date,
            end_date: query.end_date,
            periods,
            totals,
        })
    }

    /// One aggregate block. Commission-category expenses are excluded
    /// from the expense figures because commissions are taken from the
    /// commission ledger itself; counting both would double the cost.
    async fn income_figures(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        basis: Basis,
        target: &str,
    ) -> Result<IncomeFigures, AppError> {
        let revenue_sql = match basis {
            Basis::Cash => {
                r#"
                SELECT b.currency, COALESCE(SUM(p.amount_paid), 0)
                FROM booking_payments p
                JOIN bookings b ON b.id = p.booking_id
                WHERE p.status = 'paid' AND p.date >= $1 AND p.date <= $2
                GROUP BY b.currency
                "#
            }
            Basis::Accrual => {
                r#"
                SELECT b.currency, COALESCE(SUM(p.amount_paid), 0)
                FROM booking_payments p
                JOIN bookings b ON b.id = p.booking_id
                WHERE p.date >= $1 AND p.date <= $2
                GROUP BY b.currency
                "#
            }
        };
        let revenue_rows = sqlx::query_as::<_, (String, Decimal)>(revenue_sql)
            .bind(day_start(start))
            .bind(day_end(end))
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to load revenue: {}", e))
            })?;
        let revenue = self.convert_sums(revenue_rows, target).await?;

        let expense_sql = match basis {
            Basis::Cash => {
                r#"
                SELECT currency,
                       COALESCE(SUM(amount) FILTER (WHERE expense_type = 'fixed'), 0),
                       COALESCE(SUM(amount) FILTER (WHERE expense_type = 'variable'
                                AND category IN ('transportation', 'supplies', 'maintenance')), 0),
                       COALESCE(SUM(amount) FILTER (WHERE expense_type = 'variable'
                                AND category NOT IN ('transportation', 'supplies', 'maintenance')), 0),
                       COALESCE(SUM(amount), 0)
                FROM expenses
                WHERE category <> 'commission'
                  AND payment_status = 'paid'
                  AND payment_date >= $1 AND payment_date <= $2
                GROUP BY currency
                "#
            }
            Basis::Accrual => {
                r#"
                SELECT currency,
                       COALESCE(SUM(amount) FILTER (WHERE expense_type = 'fixed'), 0),
                       COALESCE(SUM(amount) FILTER (WHERE expense_type = 'variable'
                                AND category IN ('transportation', 'supplies', 'maintenance')), 0),
                       COALESCE(SUM(amount) FILTER (WHERE expense_type = 'variable'
                                AND category NOT IN ('transportation', 'supplies', 'maintenance')), 0),
                       COALESCE(SUM(amount), 0)
                FROM expenses
                WHERE category <> 'commission'
                  AND due_date >= $1 AND due_date <= $2
                GROUP BY currency
                "#
            }
        };
        let expense_rows =
            sqlx::query_as::<_, (String, Decimal, Decimal, Decimal, Decimal)>(expense_sql)
                .bind(start)
                .bind(end)
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to load expenses: {}", e))
                })?;

        let mut fixed_costs = Decimal::ZERO;
        let mut direct_variable_costs = Decimal::ZERO;
        let mut indirect_variable_costs = Decimal::ZERO;
        let mut total_expenses = Decimal::ZERO;
        for (currency, fixed, direct, indirect, total) in expense_rows {
            fixed_costs += self.currency.convert(fixed, &currency, target).await?;
            direct_variable_costs += self.currency.convert(direct, &currency, target).await?;
            indirect_variable_costs += self.currency.convert(indirect, &currency, target).await?;
            total_expenses += self.currency.convert(total, &currency, target).await?;
        }

        let commission_sql = match basis {
            Basis::Cash => {
                r#"
                SELECT currency, COALESCE(SUM(commission_amount), 0)
                FROM commissions
                WHERE status = 'paid' AND payment_date >= $1 AND payment_date <= $2
                GROUP BY currency
                "#
            }
            Basis::Accrual => {
                r#"
                SELECT currency, COALESCE(SUM(commission_amount), 0)
                FROM commissions
                WHERE status <> 'cancelled' AND created_at >= $1 AND created_at <= $2
                GROUP BY currency
                "#
            }
        };
        let commission_rows = sqlx::query_as::<_, (String, Decimal)>(commission_sql)
            .bind(day_start(start))
            .bind(day_end(end))
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to load commissions: {}", e))
            })?;
        let commissions = self.convert_sums(commission_rows, target).await?;

        let gross_profit = revenue - direct_variable_costs;
        let operating_income =
            gross_profit - (fixed_costs + indirect_variable_costs + commissions);
        let net_income = revenue - total_expenses - commissions;
        let profit_margin = if revenue.is_zero() {
            Decimal::ZERO
        } else {
            net_income / revenue * Decimal::ONE_HUNDRED
        };

        Ok(IncomeFigures {
            revenue,
            direct_variable_costs,
            indirect_variable_costs,
            fixed_costs,
            commissions,
            total_expenses,
            gross_profit,
            operating_income,
            net_income,
            profit_margin,
        })
    }

    // -------------------------------------------------------------------------
    // Cash Flow
    // -------------------------------------------------------------------------

    /// Cash movement over a range. Past buckets read settled records;
    /// future buckets read scheduled (pending) ones and are flagged as
    /// projections. There is no forecasting beyond that switch.
    #[instrument(skip(self, query))]
    pub async fn cash_flow(&self, query: &CashFlowQuery) -> Result<CashFlowResponse, AppError> {
        let timer = REPORT_DURATION
            .with_label_values(&["cash_flow"])
            .start_timer();

        if query.end_date < query.start_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "endDate is before startDate"
            )));
        }

        let period_type = match query.period_type.as_deref() {
            None => PeriodType::Monthly,
            Some(raw) => match PeriodType::parse(raw) {
                Some(p @ (PeriodType::Daily | PeriodType::Weekly | PeriodType::Monthly)) => p,
                _ => {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "periodType must be 'daily', 'weekly' or 'monthly'"
                    )))
                }
            },
        };
        let target = query.currency.as_deref().unwrap_or(DEFAULT_REPORT_CURRENCY);
        let include_projections = query.include_projections.unwrap_or(true);

        // Opening balance: everything settled strictly before the range.
        let paid_in_rows = sqlx::query_as::<_, (String, Decimal)>(
            r#"
            SELECT b.currency, COALESCE(SUM(p.amount_paid), 0)
            FROM booking_payments p
            JOIN bookings b ON b.id = p.booking_id
            WHERE p.status = 'paid' AND p.date < $1
            GROUP BY b.currency
            "#,
        )
        .bind(day_start(query.start_date))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load opening inflows: {}", e))
        })?;
        let paid_out_rows = sqlx::query_as::<_, (String, Decimal)>(
            r#"
            SELECT currency, COALESCE(SUM(amount), 0)
            FROM expenses
            WHERE payment_status = 'paid' AND payment_date < $1
            GROUP BY currency
            "#,
        )
        .bind(query.start_date)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load opening outflows: {}", e))
        })?;
        let opening_balance = self.convert_sums(paid_in_rows, target).await?
            - self.convert_sums(paid_out_rows, target).await?;

        let today = Utc::now().date_naive();
        let mut periods = Vec::new();
        let mut running_balance = opening_balance;

        for (start, end) in period_bounds(period_type, query.start_date, query.end_date) {
            let is_projection = start > today;
            if is_projection && !include_projections {
                continue;
            }

            let payment_status = if is_projection { "pending" } else { "paid" };
            let inflow_rows = sqlx::query_as::<_, (String, Decimal)>(
                r#"
                SELECT b.currency, COALESCE(SUM(p.amount_paid), 0)
                FROM booking_payments p
                JOIN bookings b ON b.id = p.booking_id
                WHERE p.status = $3 AND p.date >= $1 AND p.date <= $2
                GROUP BY b.currency
                "#,
            )
            .bind(day_start(start))
            .bind(day_end(end))
            .bind(payment_status)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to load inflows: {}", e))
            })?;
            let inflows = self.convert_sums(inflow_rows, target).await?;

            // Settled expenses go out on their payment date; scheduled
            // ones on their due date.
            let outflow_sql = if is_projection {
                r#"
                SELECT currency, COALESCE(SUM(amount), 0)
                FROM expenses
                WHERE payment_status = 'pending' AND due_date >= $1 AND due_date <= $2
                GROUP BY currency
                "#
            } else {
                r#"
                SELECT currency, COALESCE(SUM(amount), 0)
                FROM expenses
                WHERE payment_status = 'paid' AND payment_date >= $1 AND payment_date <= $2
                GROUP BY currency
                "#
            };
            let outflow_rows = sqlx::query_as::<_, (String, Decimal)>(outflow_sql)
                .bind(start)
                .bind(end)
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to load outflows: {}", e))
                })?;
            let outflows = self.convert_sums(outflow_rows, target).await?;

            let net_flow = inflows - outflows;
            running_balance += net_flow;
            periods.push(CashFlowPeriod {
                period: period_label(period_type, start),
                start_date: start,
                end_date: end,
                inflows,
                outflows,
                net_flow,
                running_balance,
                is_projection,
            });
        }

        let mut summary = CashFlowSummary::default();
        for period in &periods {
            summary.total_inflows += period.inflows;
            summary.total_outflows += period.outflows;
            if period.is_projection {
                summary.projected_inflows += period.inflows;
                summary.projected_outflows += period.outflows;
            } else {
                summary.actual_inflows += period.inflows;
                summary.actual_outflows += period.outflows;
            }
        }
        summary.net_change = summary.total_inflows - summary.total_outflows;
        summary.closing_balance = opening_balance + summary.net_change;

        timer.observe_duration();

        Ok(CashFlowResponse {
            period_type: period_type.as_str().to_string(),
            currency: target.to_string(),
            start_date: query.start_date,
            end_date: query.end_date,
            opening_balance,
            periods,
            summary,
        })
    }

    // -------------------------------------------------------------------------
    // Bank Statement
    // -------------------------------------------------------------------------

    /// Reconciliation feed for one account or all of them: settled
    /// expenses, settled booking payments and completed transfers merged
    /// into date order with a running balance.
    #[instrument(skip(self, query))]
    pub async fn bank_statement(
        &self,
        query: &BankStatementQuery,
    ) -> Result<BankStatementResponse, AppError> {
        let timer = REPORT_DURATION
            .with_label_values(&["bank_statement"])
            .start_timer();

        if query.end_date < query.start_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "endDate is before startDate"
            )));
        }

        let account = match query.account_id {
            Some(id) => Some(self.db.get_account(id).await?),
            None => None,
        };
        let target = match &account {
            Some(account) => account.currency.clone(),
            None => query
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_REPORT_CURRENCY.to_string()),
        };

        // (entry_type, date, amount, currency, description, reference)
        let mut raw_lines: Vec<(&'static str, NaiveDate, Decimal, String, String, Option<String>)> =
            Vec::new();

        let expenses = sqlx::query_as::<_, (String, Decimal, String, NaiveDate, Option<String>)>(
            r#"
            SELECT name, amount, currency, payment_date, invoice_number
            FROM expenses
            WHERE payment_status = 'paid'
              AND payment_date >= $1 AND payment_date <= $2
            GROUP BY id, name, amount, currency, payment_date, invoice_number
            ORDER BY payment_date
            "#,
        )
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load settled expenses: {}", e))
        })?;
        for (name, amount, currency, date, invoice_number) in expenses {
            raw_lines.push(("expense", date, amount, currency, name, invoice_number));
        }

        let payments = sqlx::query_as::<_, (Decimal, String, DateTime<Utc>, String, String)>(
            r#"
            SELECT p.amount_paid, b.currency, p.date, p.method, cu.name
            FROM booking_payments p
            JOIN bookings b ON b.id = p.booking_id
            JOIN customers cu ON cu.id = b.customer_id
            WHERE p.status = 'paid' AND p.date >= $1 AND p.date <= $2
            ORDER BY p.date
            "#,
        )
        .bind(day_start(query.start_date))
        .bind(day_end(query.end_date))
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load settled payments: {}", e))
        })?;
        for (amount, currency, date, method, customer) in payments {
            if let Some(account) = &account {
                if !method_matches_account(&method, &account.name) {
                    continue;
                }
            }
            raw_lines.push((
                "payment",
                date.date_naive(),
                amount,
                currency,
                format!("Booking payment - {}", customer),
                Some(method),
            ));
        }

        let transfers = sqlx::query_as::<_, (Uuid, Uuid, Decimal, String, NaiveDate, Option<String>, String, String)>(
            r#"
            SELECT t.from_account_id, t.to_account_id, t.amount, t.currency, t.transfer_date,
                   t.reference, fa.name, ta.name
            FROM bank_transfers t
            JOIN financial_accounts fa ON fa.id = t.from_account_id
            JOIN financial_accounts ta ON ta.id = t.to_account_id
            WHERE t.status = 'completed'
              AND t.transfer_date >= $1 AND t.transfer_date <= $2
            ORDER BY t.transfer_date
            "#,
        )
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load transfers: {}", e))
        })?;
        for (from_id, to_id, amount, currency, date, reference, from_name, to_name) in transfers {
            let include_out = account.as_ref().map_or(true, |a| a.id == from_id);
            let include_in = account.as_ref().map_or(true, |a| a.id == to_id);
            if include_out {
                raw_lines.push((
                    "transfer_out",
                    date,
                    amount,
                    currency.clone(),
                    format!("Transfer to {}", to_name),
                    reference.clone(),
                ));
            }
            if include_in {
                raw_lines.push((
                    "transfer_in",
                    date,
                    amount,
                    currency,
                    format!("Transfer from {}", from_name),
                    reference,
                ));
            }
        }

        raw_lines.sort_by_key(|line| line.1);

        let mut transactions = Vec::with_capacity(raw_lines.len());
        let mut totals = StatementTotals::default();
        let mut running_balance = Decimal::ZERO;
        for (entry_type, date, amount, currency, description, reference) in raw_lines {
            let converted = self.currency.convert(amount, &currency, &target).await?;
            let direction = match entry_type {
                "payment" | "transfer_in" => "in",
                _ => "out",
            };
            if direction == "in" {
                totals.total_in += converted;
                running_balance += converted;
            } else {
                totals.total_out += converted;
                running_balance -= converted;
            }
            transactions.push(StatementLine {
                date,
                description,
                entry_type: entry_type.to_string(),
                direction: direction.to_string(),
                amount: converted,
                currency: target.clone(),
                reference,
                running_balance,
            });
        }
        totals.net = totals.total_in - totals.total_out;

        timer.observe_duration();

        Ok(BankStatementResponse {
            account: account.map(|a| StatementAccount {
                id: a.id,
                name: a.name,
                currency: a.currency,
            }),
            currency: target,
            start_date: query.start_date,
            end_date: query.end_date,
            transactions,
            totals,
        })
    }

    // -------------------------------------------------------------------------
    // Receivables / Payables
    // -------------------------------------------------------------------------

    /// Full booking payment history with customer context, newest first.
    /// Unparseable date filters are ignored rather than rejected.
    #[instrument(skip(self, range))]
    pub async fn receivables(
        &self,
        range: &DateRangeQuery,
    ) -> Result<Vec<ReceivableItem>, AppError> {
        let start = parse_lenient_date(range.start_date.as_deref());
        let end = parse_lenient_date(range.end_date.as_deref());
        let (range_start, range_end) = match (start, end) {
            (Some(start), Some(end)) => (Some(day_start(start)), Some(day_end(end))),
            _ => (None, None),
        };

        let rows = sqlx::query_as::<
            _,
            (Uuid, Uuid, String, Decimal, String, DateTime<Utc>, String, String, Decimal),
        >(
            r#"
            SELECT p.id, p.booking_id, cu.name, p.amount_paid, b.currency, p.date, p.status,
                   p.method, p.percentage
            FROM booking_payments p
            JOIN bookings b ON b.id = p.booking_id
            JOIN customers cu ON cu.id = b.customer_id
            WHERE ($1::timestamptz IS NULL OR $2::timestamptz IS NULL
                   OR p.date BETWEEN $1 AND $2)
            ORDER BY p.date DESC
            "#,
        )
        .bind(range_start)
        .bind(range_end)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load receivables: {}", e))
        })?;

        Ok(rows
            .into_iter()
            .map(
                |(id, booking_id, customer_name, amount, currency, date, status, method, percentage)| {
                    ReceivableItem {
                        id,
                        booking_id,
                        customer_name,
                        amount,
                        currency,
                        due_date: date.date_naive().format("%Y-%m-%d").to_string(),
                        status,
                        method,
                        percentage,
                    }
                },
            )
            .collect())
    }

    /// Outstanding obligations: unpaid expenses and unpaid commissions.
    /// The date filter narrows expenses only; open commissions are always
    /// listed in full.
    #[instrument(skip(self, range))]
    pub async fn payables(&self, range: &DateRangeQuery) -> Result<PayablesResponse, AppError> {
        let start = parse_lenient_date(range.start_date.as_deref());
        let end = parse_lenient_date(range.end_date.as_deref());
        let (range_start, range_end) = match (start, end) {
            (Some(start), Some(end)) => (Some(start), Some(end)),
            _ => (None, None),
        };

        let expense_rows = sqlx::query_as::<
            _,
            (Uuid, String, Option<String>, Decimal, String, NaiveDate, String, String, String),
        >(
            r#"
            SELECT id, name, vendor, amount, currency, due_date, payment_status, category,
                   expense_type
            FROM expenses
            WHERE payment_status IN ('pending', 'overdue')
              AND ($1::date IS NULL OR $2::date IS NULL OR due_date BETWEEN $1 AND $2)
            ORDER BY due_date
            "#,
        )
        .bind(range_start)
        .bind(range_end)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load payable expenses: {}", e))
        })?;

        let commission_rows = sqlx::query_as::<
            _,
            (Uuid, Uuid, Option<String>, Decimal, String, String, Decimal),
        >(
            r#"
            SELECT c.id, c.booking_id, COALESCE(u.full_name, c.external_agency),
                   c.commission_amount, c.currency, c.status, c.commission_percentage
            FROM commissions c
            LEFT JOIN users u ON u.id = c.salesperson_id
            WHERE c.status IN ('pending', 'approved')
            ORDER BY c.created_at
            "#,
        )
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load payable commissions: {}", e))
        })?;

        Ok(PayablesResponse {
            expenses: expense_rows
                .into_iter()
                .map(
                    |(id, name, vendor, amount, currency, due_date, status, category, expense_type)| {
                        PayableExpense {
                            id,
                            name,
                            vendor,
                            amount,
                            currency,
                            due_date,
                            status,
                            category,
                            expense_type,
                        }
                    },
                )
                .collect(),
            commissions: commission_rows
                .into_iter()
                .map(|(id, booking_id, salesperson, amount, currency, status, percentage)| {
                    PayableCommission {
                        id,
                        booking_id,
                        salesperson,
                        amount,
                        currency,
                        status,
                        percentage,
                    }
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn monthly_bounds_clamp_to_range() {
        let bounds = period_bounds(PeriodType::Monthly, date(2026, 1, 15), date(2026, 3, 10));
        assert_eq!(
            bounds,
            vec![
                (date(2026, 1, 15), date(2026, 1, 31)),
                (date(2026, 2, 1), date(2026, 2, 28)),
                (date(2026, 3, 1), date(2026, 3, 10)),
            ]
        );
    }

    #[test]
    fn weekly_bounds_split_on_mondays() {
        // 2026-01-15 is a Thursday.
        let bounds = period_bounds(PeriodType::Weekly, date(2026, 1, 15), date(2026, 1, 28));
        assert_eq!(
            bounds,
            vec![
                (date(2026, 1, 15), date(2026, 1, 18)),
                (date(2026, 1, 19), date(2026, 1, 25)),
                (date(2026, 1, 26), date(2026, 1, 28)),
            ]
        );
    }

    #[test]
    fn daily_bounds_cover_every_day() {
        let bounds = period_bounds(PeriodType::Daily, date(2026, 2, 27), date(2026, 3, 1));
        assert_eq!(bounds.len(), 3);
        assert_eq!(bounds[0], (date(2026, 2, 27), date(2026, 2, 27)));
        assert_eq!(bounds[2], (date(2026, 3, 1), date(2026, 3, 1)));
    }

    #[test]
    fn period_labels_follow_the_period_type() {
        assert_eq!(period_label(PeriodType::Daily, date(2026, 3, 5)), "2026-03-05");
        assert_eq!(period_label(PeriodType::Weekly, date(2026, 1, 19)), "2026-W04");
        assert_eq!(period_label(PeriodType::Monthly, date(2026, 3, 1)), "2026-03");
        assert_eq!(period_label(PeriodType::Annual, date(2026, 1, 1)), "2026");
    }

    #[test]
    fn month_end_handles_december_and_leap_years() {
        assert_eq!(month_end(date(2026, 12, 5)), date(2026, 12, 31));
        assert_eq!(month_end(date(2024, 2, 1)), date(2024, 2, 29));
        assert_eq!(month_end(date(2026, 2, 10)), date(2026, 2, 28));
    }

    #[test]
    fn month_start_back_crosses_year_boundaries() {
        assert_eq!(month_start_back(date(2026, 3, 15), 0), date(2026, 3, 1));
        assert_eq!(month_start_back(date(2026, 3, 15), 2), date(2026, 1, 1));
        assert_eq!(month_start_back(date(2026, 3, 15), 5), date(2025, 10, 1));
    }

    #[test]
    fn one_year_before_handles_leap_day() {
        assert_eq!(one_year_before(date(2026, 8, 22)), date(2025, 8, 22));
        assert_eq!(one_year_before(date(2024, 2, 29)), date(2023, 2, 28));
    }

    #[test]
    fn yoy_change_is_null_without_prior_data() {
        assert_eq!(yoy_change(dec!(100), Decimal::ZERO), None);
        assert_eq!(yoy_change(dec!(150), dec!(100)), Some(dec!(50)));
        assert_eq!(yoy_change(dec!(50), dec!(100)), Some(dec!(-50)));
    }

    #[test]
    fn method_matching_ignores_case_and_punctuation() {
        assert!(method_matches_account("Banco Estado - Checking", "banco estado"));
        assert!(method_matches_account("santander", "Banco Santander #1234"));
        assert!(!method_matches_account("cash", "Banco Estado"));
        assert!(!method_matches_account("", "Banco Estado"));
    }

    #[test]
    fn lenient_date_parse_drops_garbage() {
        assert_eq!(parse_lenient_date(Some("2026-05-01")), Some(date(2026, 5, 1)));
        assert_eq!(parse_lenient_date(Some("05/01/2026")), None);
        assert_eq!(parse_lenient_date(None), None);
    }
}
