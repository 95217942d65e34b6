//! Read models for the reservation records the ledgers hang off.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Booking header as written by the reservations side.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub sales_person_id: Option<Uuid>,
    pub currency: String,
    pub status: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One tour line inside a booking. `operator` distinguishes tours the
/// company runs itself from tours bought in from a third party.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BookingTour {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub tour_id: Uuid,
    pub date: DateTime<Utc>,
    pub adult_pax: i32,
    pub child_pax: i32,
    pub infant_pax: i32,
    pub subtotal: Decimal,
    pub operator: String,
    pub operator_name: String,
    pub tour_status: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
