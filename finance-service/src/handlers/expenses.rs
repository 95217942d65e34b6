//! Expense CRUD and summary endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{filter_value, parse_lenient_date};
use crate::middleware::CurrentUser;
use crate::models::{
    CreateExpenseRequest, Expense, ExpenseFilters, ExpenseSummary, UpdateExpenseRequest,
};
use crate::startup::AppState;
use service_core::error::AppError;

/// Query params for listing expenses. The date range filters on due_date.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseListQuery {
    pub expense_type: Option<String>,
    pub category: Option<String>,
    pub payment_status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
}

/// GET /api/financial/expenses/
#[tracing::instrument(skip(state, _user, query))]
pub async fn list_expenses(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ExpenseListQuery>,
) -> Result<Json<Vec<Expense>>, AppError> {
    let filters = ExpenseFilters {
        expense_type: filter_value(query.expense_type),
        category: filter_value(query.category),
        payment_status: filter_value(query.payment_status),
        start_date: parse_lenient_date(query.start_date.as_deref()),
        end_date: parse_lenient_date(query.end_date.as_deref()),
        search: filter_value(query.search),
    };
    Ok(Json(state.db.list_expenses(&filters).await?))
}

/// POST /api/financial/expenses/
#[tracing::instrument(skip(state, user, request))]
pub async fn create_expense(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<Expense>), AppError> {
    request.validate()?;
    let expense = state.db.create_expense(&request, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

/// GET /api/financial/expenses/summary/
#[tracing::instrument(skip(state, _user))]
pub async fn expense_summary(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<ExpenseSummary>, AppError> {
    Ok(Json(state.db.expense_summary().await?))
}

/// GET /api/financial/expenses/{id}/
#[tracing::instrument(skip(state, _user), fields(expense_id = %expense_id))]
pub async fn get_expense(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<Expense>, AppError> {
    Ok(Json(state.db.get_expense(expense_id).await?))
}

/// PUT /api/financial/expenses/{id}/
#[tracing::instrument(skip(state, _user, update), fields(expense_id = %expense_id))]
pub async fn update_expense(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(expense_id): Path<Uuid>,
    Json(update): Json<UpdateExpenseRequest>,
) -> Result<Json<Expense>, AppError> {
    Ok(Json(state.db.update_expense(expense_id, &update).await?))
}

/// DELETE /api/financial/expenses/{id}/
#[tracing::instrument(skip(state, _user), fields(expense_id = %expense_id))]
pub async fn delete_expense(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(expense_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.db.delete_expense(expense_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
