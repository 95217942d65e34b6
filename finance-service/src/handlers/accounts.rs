//! Payment account CRUD and transfers between accounts.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::{filter_value, parse_bool};
use crate::middleware::CurrentUser;
use crate::models::{
    AccountFilters, BankTransfer, CreateAccountRequest, CreateTransferRequest, FinancialAccount,
    UpdateAccountRequest,
};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountListQuery {
    pub is_active: Option<String>,
    pub currency: Option<String>,
}

/// GET /api/financial/accounts/
#[tracing::instrument(skip(state, _user, query))]
pub async fn list_accounts(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<AccountListQuery>,
) -> Result<Json<Vec<FinancialAccount>>, AppError> {
    let filters = AccountFilters {
        is_active: parse_bool(query.is_active.as_deref()),
        currency: filter_value(query.currency),
    };
    Ok(Json(state.db.list_accounts(&filters).await?))
}

/// POST /api/financial/accounts/
#[tracing::instrument(skip(state, user, request))]
pub async fn create_account(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<FinancialAccount>), AppError> {
    request.validate()?;
    let account = state.db.create_account(&request, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /api/financial/accounts/{id}/
#[tracing::instrument(skip(state, _user), fields(account_id = %account_id))]
pub async fn get_account(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(account_id): Path<Uuid>,
) -> Result<Json<FinancialAccount>, AppError> {
    Ok(Json(state.db.get_account(account_id).await?))
}

/// PUT /api/financial/accounts/{id}/
#[tracing::instrument(skip(state, _user, update), fields(account_id = %account_id))]
pub async fn update_account(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(account_id): Path<Uuid>,
    Json(update): Json<UpdateAccountRequest>,
) -> Result<Json<FinancialAccount>, AppError> {
    Ok(Json(state.db.update_account(account_id, &update).await?))
}

/// DELETE /api/financial/accounts/{id}/
#[tracing::instrument(skip(state, _user), fields(account_id = %account_id))]
pub async fn delete_account(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(account_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.db.delete_account(account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/financial/transfers/
#[tracing::instrument(skip(state, _user))]
pub async fn list_transfers(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<BankTransfer>>, AppError> {
    Ok(Json(state.db.list_transfers().await?))
}

/// POST /api/financial/transfers/
///
/// The transfer is recorded in the source account's currency; the
/// credited amount is converted when the destination differs.
#[tracing::instrument(skip(state, user, request))]
pub async fn create_transfer(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateTransferRequest>,
) -> Result<(StatusCode, Json<BankTransfer>), AppError> {
    if request.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Transfer amount must be positive"
        )));
    }
    if request.from_account_id == request.to_account_id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Cannot transfer an account to itself"
        )));
    }

    let from = state.db.get_account(request.from_account_id).await?;
    let to = state.db.get_account(request.to_account_id).await?;

    let amount_in = state
        .currency
        .convert(request.amount, &from.currency, &to.currency)
        .await?;

    let transfer = state
        .db
        .create_transfer(&request, &from.currency, amount_in, Some(user.id))
        .await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}
