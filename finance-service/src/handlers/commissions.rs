//! Commission ledger endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::handlers::{date_range, filter_value, parse_bool};
use crate::middleware::CurrentUser;
use crate::models::{
    Commission, CommissionFilters, CommissionListRow, CommissionSummary, DateFilterKind,
    TourOption, UpdateCommissionRequest,
};
use crate::startup::AppState;
use service_core::error::AppError;

/// Query params shared by the list and summary endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// "sale" (default) or "operation".
    pub date_type: Option<String>,
    pub tour: Option<String>,
    pub salesperson: Option<String>,
    pub external_agency: Option<String>,
    pub commission_status: Option<String>,
    pub search_term: Option<String>,
    pub is_closed: Option<String>,
    pub recipient_type: Option<String>,
    pub reservation_status: Option<String>,
}

impl CommissionListQuery {
    fn into_filters(self) -> CommissionFilters {
        let (start_date, end_date) =
            date_range(self.start_date.as_deref(), self.end_date.as_deref());
        CommissionFilters {
            start_date,
            end_date,
            date_kind: self
                .date_type
                .as_deref()
                .map(DateFilterKind::from_string)
                .unwrap_or_default(),
            tour_id: filter_value(self.tour).and_then(|s| Uuid::parse_str(&s).ok()),
            salesperson: filter_value(self.salesperson),
            external_agency: filter_value(self.external_agency),
            status: filter_value(self.commission_status),
            search: filter_value(self.search_term),
            is_closed: parse_bool(self.is_closed.as_deref()),
            recipient_type: filter_value(self.recipient_type),
            reservation_status: filter_value(self.reservation_status),
        }
    }
}

/// GET /api/commissions/
#[tracing::instrument(skip(state, _user, query))]
pub async fn list_commissions(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<CommissionListQuery>,
) -> Result<Json<Vec<CommissionListRow>>, AppError> {
    let commissions = state.db.list_commissions(&query.into_filters()).await?;
    Ok(Json(commissions))
}

/// GET /api/commissions/summary/
#[tracing::instrument(skip(state, _user, query))]
pub async fn commission_summary(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<CommissionListQuery>,
) -> Result<Json<CommissionSummary>, AppError> {
    let summary = state.db.commission_summary(&query.into_filters()).await?;
    Ok(Json(summary))
}

/// GET /api/commissions/unique-values/
#[tracing::instrument(skip(state, _user))]
pub async fn unique_values(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<crate::models::CommissionUniqueValues>, AppError> {
    Ok(Json(state.db.commission_unique_values().await?))
}

/// Commission filter options plus the operator-side ones, for screens
/// that filter both ledgers at once.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedUniqueValues {
    pub salespersons: Vec<String>,
    pub agencies: Vec<String>,
    pub tours: Vec<TourOption>,
    pub operators: Vec<String>,
    pub logistic_statuses: Vec<String>,
    pub payment_statuses: Vec<String>,
}

/// GET /api/commissions/extended-unique-values/
#[tracing::instrument(skip(state, _user))]
pub async fn extended_unique_values(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<ExtendedUniqueValues>, AppError> {
    let base = state.db.commission_unique_values().await?;
    let operators = state.db.operator_unique_values().await?;
    Ok(Json(ExtendedUniqueValues {
        salespersons: base.salespersons,
        agencies: base.agencies,
        tours: base.tours,
        operators: operators.operators,
        logistic_statuses: operators.logistic_statuses,
        payment_statuses: operators.payment_statuses,
    }))
}

/// PUT /api/commissions/{id}/
#[tracing::instrument(skip(state, _user, update), fields(commission_id = %commission_id))]
pub async fn update_commission(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(commission_id): Path<Uuid>,
    Json(update): Json<UpdateCommissionRequest>,
) -> Result<Json<Commission>, AppError> {
    let commission = state.db.update_commission(commission_id, &update).await?;
    Ok(Json(commission))
}
