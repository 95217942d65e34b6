//! Financial report endpoints: dashboard, income statement, cash flow,
//! bank statement, receivables and payables. All aggregation happens in
//! the report service; these handlers only shape the request.

use axum::extract::{Query, State};
use axum::Json;

use crate::middleware::CurrentUser;
use crate::models::report::{
    BankStatementQuery, BankStatementResponse, CashFlowQuery, CashFlowResponse, DashboardQuery,
    DashboardResponse, DateRangeQuery, IncomeStatementQuery, IncomeStatementResponse,
    PayablesResponse, ReceivableItem,
};
use crate::startup::AppState;
use service_core::error::AppError;

/// GET /api/financial/dashboard/
#[tracing::instrument(skip(state, _user, query))]
pub async fn dashboard(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardResponse>, AppError> {
    Ok(Json(state.reports.dashboard(&query).await?))
}

/// GET /api/financial/income-statement/
#[tracing::instrument(skip(state, _user, query))]
pub async fn income_statement(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<IncomeStatementQuery>,
) -> Result<Json<IncomeStatementResponse>, AppError> {
    Ok(Json(state.reports.income_statement(&query).await?))
}

/// GET /api/financial/cash-flow/
#[tracing::instrument(skip(state, _user, query))]
pub async fn cash_flow(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<CashFlowQuery>,
) -> Result<Json<CashFlowResponse>, AppError> {
    Ok(Json(state.reports.cash_flow(&query).await?))
}

/// GET /api/financial/bank-statement/
#[tracing::instrument(skip(state, _user, query))]
pub async fn bank_statement(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<BankStatementQuery>,
) -> Result<Json<BankStatementResponse>, AppError> {
    Ok(Json(state.reports.bank_statement(&query).await?))
}

/// GET /api/financial/receivables/
#[tracing::instrument(skip(state, _user, query))]
pub async fn receivables(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<Vec<ReceivableItem>>, AppError> {
    Ok(Json(state.reports.receivables(&query).await?))
}

/// GET /api/financial/payables/
#[tracing::instrument(skip(state, _user, query))]
pub async fn payables(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<PayablesResponse>, AppError> {
    Ok(Json(state.reports.payables(&query).await?))
}
