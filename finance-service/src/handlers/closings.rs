//! Closing endpoints: close commissions, browse closings, undo.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::handlers::{filter_value, parse_bool};
use crate::middleware::{CurrentUser, RequestMeta};
use crate::models::{
    CloseCommissionsRequest, ClosingFilters, ClosingType, Commission, CommissionAuditLog,
    CommissionClosing, OperatorPayment, UndoClosingRequest,
};
use crate::services::{CloseCommand, CloseOutcome};
use crate::startup::AppState;
use service_core::error::AppError;

/// Assemble a close command from request parts. Adjustments are a
/// staff-only feature; a non-staff caller supplying any is rejected
/// before anything touches the database.
pub(crate) fn build_close_command(
    item_ids: Vec<Uuid>,
    closing_type: &str,
    recipient_name: String,
    recipient_id: Option<Uuid>,
    period_start: NaiveDate,
    period_end: NaiveDate,
    currency: String,
    adjustments: Option<HashMap<Uuid, Decimal>>,
    user: &CurrentUser,
    meta: &RequestMeta,
) -> Result<CloseCommand, AppError> {
    let closing_type = ClosingType::parse(closing_type).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "closing_type must be one of 'salesperson', 'agency' or 'operator'"
        ))
    })?;

    let adjustments = adjustments.unwrap_or_default();
    if !adjustments.is_empty() && !user.is_staff {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only staff may apply manual adjustments"
        )));
    }

    Ok(CloseCommand {
        item_ids,
        closing_type,
        recipient_name,
        recipient_id,
        period_start,
        period_end,
        currency,
        adjustments,
        actor: Some(user.id),
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
    })
}

/// Closing plus the id of the expense it created.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingCreatedResponse {
    pub closing: CommissionClosing,
    pub expense_id: Uuid,
}

/// 400 body naming the items that block an operator closing.
#[derive(Debug, Serialize)]
pub struct NonClosableResponse {
    pub error: String,
    pub non_closable_ids: Vec<Uuid>,
}

pub(crate) fn close_outcome_response(outcome: CloseOutcome) -> Response {
    match outcome {
        CloseOutcome::Closed {
            closing,
            expense_id,
        } => (
            StatusCode::CREATED,
            Json(ClosingCreatedResponse {
                closing,
                expense_id,
            }),
        )
            .into_response(),
        CloseOutcome::Blocked { non_closable_ids } => (
            StatusCode::BAD_REQUEST,
            Json(NonClosableResponse {
                error: "Some items are not ready to close".to_string(),
                non_closable_ids,
            }),
        )
            .into_response(),
    }
}

/// POST /api/commissions/close/
#[tracing::instrument(skip(state, user, meta, request), fields(items = request.commission_ids.len()))]
pub async fn close_commissions(
    State(state): State<AppState>,
    user: CurrentUser,
    meta: RequestMeta,
    Json(request): Json<CloseCommissionsRequest>,
) -> Result<Response, AppError> {
    let cmd = build_close_command(
        request.commission_ids,
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
    let outcome = state.closing_engine.close_commissions(cmd).await?;
    Ok(close_outcome_response(outcome))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingListQuery {
    pub closing_type: Option<String>,
    pub is_active: Option<String>,
}

/// GET /api/commissions/closings/
#[tracing::instrument(skip(state, _user, query))]
pub async fn list_closings(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ClosingListQuery>,
) -> Result<Json<Vec<CommissionClosing>>, AppError> {
    let filters = ClosingFilters {
        closing_type: filter_value(query.closing_type),
        is_active: parse_bool(query.is_active.as_deref()),
    };
    Ok(Json(state.db.list_closings(&filters).await?))
}

/// Closing with its member items and audit trail. Commission closings
/// carry `commissions`, operator closings `operatorPayments`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingDetailResponse {
    pub closing: CommissionClosing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commissions: Option<Vec<Commission>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_payments: Option<Vec<OperatorPayment>>,
    pub audit_log: Vec<CommissionAuditLog>,
}

/// GET /api/commissions/closings/{id}/
#[tracing::instrument(skip(state, _user), fields(closing_id = %closing_id))]
pub async fn get_closing(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(closing_id): Path<Uuid>,
) -> Result<Json<ClosingDetailResponse>, AppError> {
    let closing = state.db.get_closing(closing_id).await?;
    let audit_log = state.db.closing_audit_log(closing_id).await?;

    let (commissions, operator_payments) = match ClosingType::parse(&closing.closing_type) {
        Some(ClosingType::Operator) => (
            None,
            Some(state.db.closing_operator_payments(closing_id).await?),
        ),
        _ => (Some(state.db.closing_commissions(closing_id).await?), None),
    };

    Ok(Json(ClosingDetailResponse {
        closing,
        commissions,
        operator_payments,
        audit_log,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoClosingResponse {
    pub reopened_count: usize,
}

/// POST /api/commissions/closings/{id}/undo/
#[tracing::instrument(skip(state, user, meta, request), fields(closing_id = %closing_id))]
pub async fn undo_closing(
    State(state): State<AppState>,
    user: CurrentUser,
    meta: RequestMeta,
    Path(closing_id): Path<Uuid>,
    Json(request): Json<UndoClosingRequest>,
) -> Result<Json<UndoClosingResponse>, AppError> {
    if !user.is_staff {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only staff may undo a closing"
        )));
    }

    let reopened_count = state
        .closing_engine
        .undo(
            closing_id,
            &request.reason,
            Some(user.id),
            meta.ip_address.clone(),
            meta.user_agent.clone(),
        )
        .await?;

    Ok(Json(UndoClosingResponse { reopened_count }))
}
