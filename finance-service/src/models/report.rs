//! Wire shapes for the financial reporting endpoints. These payloads are
//! hand-built (not row serializations) and keep the camelCase keys the
//! back-office frontend consumes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Dashboard

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub currency: Option<String>,
}

/// Count plus converted amount for one alert bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertBucket {
    pub count: i64,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAlerts {
    pub overdue_payments: AlertBucket,
    pub upcoming_payments: AlertBucket,
    pub overdue_expenses: AlertBucket,
    pub upcoming_expenses: AlertBucket,
}

/// Current window vs the same window one year earlier. `yoy_change` is
/// null when the prior window has no data, rather than a fake 100%.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YoyMetric<T> {
    pub current: T,
    pub previous: T,
    pub yoy_change: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_revenue: YoyMetric<Decimal>,
    pub active_reservations: YoyMetric<i64>,
    pub total_customers: YoyMetric<i64>,
    pub ytd_pax: YoyMetric<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyTrend {
    /// "YYYY-MM".
    pub month: String,
    pub sales: Decimal,
    pub reservations: i64,
    pub pax: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub alerts: DashboardAlerts,
    pub metrics: DashboardMetrics,
    pub monthly_trends: Vec<MonthlyTrend>,
    pub currency: String,
}

// ---------------------------------------------------------------------------
// Income statement

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatementQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_type: Option<String>,
    pub basis: Option<String>,
    pub currency: Option<String>,
}

/// One set of income statement figures; used per period and for totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeFigures {
    pub revenue: Decimal,
    pub direct_variable_costs: Decimal,
    pub indirect_variable_costs: Decimal,
    pub fixed_costs: Decimal,
    pub commissions: Decimal,
    pub total_expenses: Decimal,
    pub gross_profit: Decimal,
    pub operating_income: Decimal,
    pub net_income: Decimal,
    pub profit_margin: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomePeriod {
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(flatten)]
    pub figures: IncomeFigures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatementResponse {
    pub period_type: String,
    pub basis: String,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub periods: Vec<IncomePeriod>,
    pub totals: IncomeFigures,
}

// ---------------------------------------------------------------------------
// Cash flow

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub period_type: Option<String>,
    pub currency: Option<String>,
    pub include_projections: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowPeriod {
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub inflows: Decimal,
    pub outflows: Decimal,
    pub net_flow: Decimal,
    pub running_balance: Decimal,
    pub is_projection: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowSummary {
    pub total_inflows: Decimal,
    pub total_outflows: Decimal,
    pub net_change: Decimal,
    pub closing_balance: Decimal,
    pub actual_inflows: Decimal,
    pub actual_outflows: Decimal,
    pub projected_inflows: Decimal,
    pub projected_outflows: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowResponse {
    pub period_type: String,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub opening_balance: Decimal,
    pub periods: Vec<CashFlowPeriod>,
    pub summary: CashFlowSummary,
}

// ---------------------------------------------------------------------------
// Bank statement

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankStatementQuery {
    pub account_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementAccount {
    pub id: Uuid,
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementLine {
    pub date: NaiveDate,
    pub description: String,
    /// payment-in, expense-out, transfer-in or transfer-out.
    pub entry_type: String,
    /// "in" or "out".
    pub direction: String,
    pub amount: Decimal,
    pub currency: String,
    pub reference: Option<String>,
    pub running_balance: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementTotals {
    pub total_in: Decimal,
    pub total_out: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankStatementResponse {
    pub account: Option<StatementAccount>,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub transactions: Vec<StatementLine>,
    pub totals: StatementTotals,
}

// ---------------------------------------------------------------------------
// Receivables / payables

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivableItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub customer_name: String,
    pub amount: Decimal,
    pub currency: String,
    /// Payment date formatted "YYYY-MM-DD".
    pub due_date: String,
    pub status: String,
    pub method: String,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayableExpense {
    pub id: Uuid,
    pub name: String,
    pub vendor: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub due_date: NaiveDate,
    pub status: String,
    pub category: String,
    pub expense_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayableCommission {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub salesperson: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayablesResponse {
    pub expenses: Vec<PayableExpense>,
    pub commissions: Vec<PayableCommission>,
}
