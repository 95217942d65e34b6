//! Reservation event endpoints. The reservation system calls these
//! after persisting a booking or booking tour; the ledgers react by
//! creating or refreshing their derived rows.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::CurrentUser;
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEventResponse {
    /// Set when this event created the commission row.
    pub commission_id: Option<Uuid>,
}

/// POST /api/events/bookings/{id}/
#[tracing::instrument(skip(state, user), fields(booking_id = %booking_id))]
pub async fn booking_persisted(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(booking_id): Path<Uuid>,
) -> Result<(StatusCode, Json<BookingEventResponse>), AppError> {
    let commission_id = state
        .ledger_events
        .on_booking_persisted(booking_id, Some(user.id))
        .await?;
    Ok((StatusCode::OK, Json(BookingEventResponse { commission_id })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingTourEventResponse {
    /// Set when this event created the operator payment row.
    pub operator_payment_id: Option<Uuid>,
}

/// POST /api/events/booking-tours/{id}/
#[tracing::instrument(skip(state, user), fields(booking_tour_id = %booking_tour_id))]
pub async fn booking_tour_persisted(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(booking_tour_id): Path<Uuid>,
) -> Result<(StatusCode, Json<BookingTourEventResponse>), AppError> {
    let operator_payment_id = state
        .ledger_events
        .on_booking_tour_persisted(booking_tour_id, Some(user.id))
        .await?;
    Ok((
        StatusCode::OK,
        Json(BookingTourEventResponse {
            operator_payment_id,
        }),
    ))
}
