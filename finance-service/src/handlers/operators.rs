//! Operator payment ledger endpoints, mirroring the commission surface.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::closings::{build_close_command, close_outcome_response};
use crate::handlers::{date_range, filter_value, parse_bool};
use crate::middleware::{CurrentUser, RequestMeta};
use crate::models::{
    CloseOperatorPaymentsRequest, OperatorFilters, OperatorPayment, OperatorPaymentListRow,
    OperatorSummary, OperatorUniqueValues, UpdateOperatorPaymentRequest,
};
use crate::startup::AppState;
use service_core::error::AppError;

/// Query params shared by the list and summary endpoints. The date
/// range filters on the tour date.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub operator: Option<String>,
    pub logistic_status: Option<String>,
    pub payment_status: Option<String>,
    pub is_closed: Option<String>,
    pub search_term: Option<String>,
}

impl OperatorListQuery {
    fn into_filters(self) -> OperatorFilters {
        let (start_date, end_date) =
            date_range(self.start_date.as_deref(), self.end_date.as_deref());
        OperatorFilters {
            start_date,
            end_date,
            operator: filter_value(self.operator),
            logistic_status: filter_value(self.logistic_status),
            status: filter_value(self.payment_status),
            is_closed: parse_bool(self.is_closed.as_deref()),
            search: filter_value(self.search_term),
        }
    }
}

/// GET /api/operators/
#[tracing::instrument(skip(state, _user, query))]
pub async fn list_operator_payments(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<OperatorListQuery>,
) -> Result<Json<Vec<OperatorPaymentListRow>>, AppError> {
    let payments = state.db.list_operator_payments(&query.into_filters()).await?;
    Ok(Json(payments))
}

/// GET /api/operators/summary/
#[tracing::instrument(skip(state, _user, query))]
pub async fn operator_summary(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<OperatorListQuery>,
) -> Result<Json<OperatorSummary>, AppError> {
    let summary = state.db.operator_summary(&query.into_filters()).await?;
    Ok(Json(summary))
}

/// GET /api/operators/unique-values/
#[tracing::instrument(skip(state, _user))]
pub async fn unique_values(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<OperatorUniqueValues>, AppError> {
    Ok(Json(state.db.operator_unique_values().await?))
}

/// POST /api/operators/close/
#[tracing::instrument(skip(state, user, meta, request), fields(items = request.operator_payment_ids.len()))]
pub async fn close_operator_payments(
    State(state): State<AppState>,
    user: CurrentUser,
    meta: RequestMeta,
    Json(request): Json<CloseOperatorPaymentsRequest>,
) -> Result<Response, AppError> {
    let cmd = build_close_command(
        request.operator_payment_ids,
        &request.closing_type,
        request.recipient_name,
        request.recipient_id,
        request.period_start,
        request.period_end,
        request.currency,
        request.adjustments,
        &user,
        &meta,
    )?;
    let outcome = state.closing_engine.close_operator_payments(cmd).await?;
    Ok(close_outcome_response(outcome))
}

/// PUT /api/operators/{id}/
#[tracing::instrument(skip(state, _user, update), fields(payment_id = %payment_id))]
pub async fn update_operator_payment(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(payment_id): Path<Uuid>,
    Json(update): Json<UpdateOperatorPaymentRequest>,
) -> Result<Json<OperatorPayment>, AppError> {
    let payment = state.db.update_operator_payment(payment_id, &update).await?;
    Ok(Json(payment))
}
