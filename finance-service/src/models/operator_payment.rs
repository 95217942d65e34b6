//! Operator payment ledger: what the company owes external operators
//! for bought-in tours, one row per third-party booking tour.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Operational state of the underlying tour, mirrored onto the payment
/// row. Gates whether the row can enter a closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogisticStatus {
    Pending,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl LogisticStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogisticStatus::Pending => "pending",
            LogisticStatus::Confirmed => "confirmed",
            LogisticStatus::Cancelled => "cancelled",
            LogisticStatus::NoShow => "no-show",
            LogisticStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LogisticStatus::Pending),
            "confirmed" => Some(LogisticStatus::Confirmed),
            "cancelled" => Some(LogisticStatus::Cancelled),
            "no-show" => Some(LogisticStatus::NoShow),
            "completed" => Some(LogisticStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogisticStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map a booking tour's operational status onto the payment row.
/// Checked-in tours count as confirmed; anything unknown stays pending.
pub fn logistic_status_for_tour(tour_status: &str) -> LogisticStatus {
    match tour_status {
        "confirmed" | "checked-in" => LogisticStatus::Confirmed,
        "cancelled" => LogisticStatus::Cancelled,
        "no-show" => LogisticStatus::NoShow,
        "completed" => LogisticStatus::Completed,
        _ => LogisticStatus::Pending,
    }
}

/// Operator payment ledger row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OperatorPayment {
    pub id: Uuid,
    pub booking_tour_id: Uuid,
    pub operator_name: String,
    pub operation_type: String,
    pub cost_amount: Decimal,
    pub currency: String,
    pub logistic_status: String,
    pub status: String,
    pub is_closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<Uuid>,
    pub closing_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OperatorPayment {
    /// A row can only be settled once the tour has actually resolved.
    pub fn can_close(&self) -> bool {
        self.logistic_status != LogisticStatus::Pending.as_str()
    }
}

/// Operator payment joined with its tour and booking context.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OperatorPaymentListRow {
    pub id: Uuid,
    pub booking_tour_id: Uuid,
    pub operator_name: String,
    pub operation_type: String,
    pub cost_amount: Decimal,
    pub currency: String,
    pub logistic_status: String,
    pub status: String,
    pub is_closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub closing_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub booking_id: Uuid,
    pub tour_name: String,
    pub tour_date: DateTime<Utc>,
    pub tour_subtotal: Decimal,
    pub customer_name: String,
}

impl OperatorPaymentListRow {
    pub fn can_close(&self) -> bool {
        self.logistic_status != LogisticStatus::Pending.as_str()
    }
}

/// Filter parameters for listing operator payments.
#[derive(Debug, Clone, Default)]
pub struct OperatorFilters {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub operator: Option<String>,
    pub logistic_status: Option<String>,
    pub status: Option<String>,
    pub is_closed: Option<bool>,
    pub search: Option<String>,
}

/// Aggregates over the filtered operator payment set.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSummary {
    pub total_costs: Decimal,
    pub pending_costs: Decimal,
    pub paid_costs: Decimal,
    pub payment_count: i64,
    pub closable_count: i64,
}

/// Distinct filter options appearing across the operator ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorUniqueValues {
    pub operators: Vec<String>,
    pub logistic_statuses: Vec<String>,
    pub payment_statuses: Vec<String>,
}

/// Partial update for an operator payment row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOperatorPaymentRequest {
    pub status: Option<String>,
    pub logistic_status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tour_status_maps_onto_logistics() {
        assert_eq!(logistic_status_for_tour("pending"), LogisticStatus::Pending);
        assert_eq!(logistic_status_for_tour("confirmed"), LogisticStatus::Confirmed);
        assert_eq!(logistic_status_for_tour("checked-in"), LogisticStatus::Confirmed);
        assert_eq!(logistic_status_for_tour("cancelled"), LogisticStatus::Cancelled);
        assert_eq!(logistic_status_for_tour("no-show"), LogisticStatus::NoShow);
        assert_eq!(logistic_status_for_tour("completed"), LogisticStatus::Completed);
        assert_eq!(logistic_status_for_tour("weird"), LogisticStatus::Pending);
    }

    #[test]
    fn pending_logistics_block_closing() {
        let mut payment = OperatorPayment {
            id: Uuid::new_v4(),
            booking_tour_id: Uuid::new_v4(),
            operator_name: "Andes Trips".into(),
            operation_type: "third-party".into(),
            cost_amount: Decimal::from(100),
            currency: "CLP".into(),
            logistic_status: "pending".into(),
            status: "pending".into(),
            is_closed: false,
            closed_at: None,
            closed_by: None,
            closing_id: None,
            invoice_number: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!payment.can_close());
        payment.logistic_status = "confirmed".into();
        assert!(payment.can_close());
    }
}
