//! Commission ledger model: one row per booking, derived from the
//! booking's tour lines and the salesperson's stored rate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Commission lifecycle. Rows start pending, get approved for payout and
/// end up paid or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Paid => "paid",
            CommissionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommissionStatus::Pending),
            "approved" => Some(CommissionStatus::Approved),
            "paid" => Some(CommissionStatus::Paid),
            "cancelled" => Some(CommissionStatus::Cancelled),
            _ => None,
        }
    }

    /// Allowed forward transitions. Paid and cancelled are terminal.
    pub fn can_transition_to(&self, next: CommissionStatus) -> bool {
        matches!(
            (self, next),
            (CommissionStatus::Pending, CommissionStatus::Approved)
                | (CommissionStatus::Pending, CommissionStatus::Cancelled)
                | (CommissionStatus::Approved, CommissionStatus::Paid)
                | (CommissionStatus::Approved, CommissionStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Commission amount from the net figure and a percentage rate.
pub fn compute_commission_amount(net: Decimal, percentage: Decimal) -> Decimal {
    net * percentage / Decimal::from(100)
}

/// Commission ledger row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Commission {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub salesperson_id: Option<Uuid>,
    pub external_agency: Option<String>,
    pub gross_total: Decimal,
    pub costs: Decimal,
    pub net_received: Decimal,
    pub commission_percentage: Decimal,
    pub commission_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub is_closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<Uuid>,
    pub closing_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Commission {
    pub fn parsed_status(&self) -> Option<CommissionStatus> {
        CommissionStatus::parse(&self.status)
    }
}

/// Commission row joined with its booking context for list responses.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CommissionListRow {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub salesperson_id: Option<Uuid>,
    pub external_agency: Option<String>,
    pub gross_total: Decimal,
    pub costs: Decimal,
    pub net_received: Decimal,
    pub commission_percentage: Decimal,
    pub commission_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub is_closed: bool,
    pub closed_at: Option<DateTime<Utc>>,
    pub closing_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub customer_name: String,
    pub salesperson_name: Option<String>,
    pub booking_status: String,
    pub sale_date: DateTime<Utc>,
    pub operation_date: Option<DateTime<Utc>>,
    pub tour_names: Vec<String>,
}

/// Which booking date the commission date range filters against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFilterKind {
    /// Booking creation date.
    #[default]
    Sale,
    /// Any of the booking's tour dates.
    Operation,
}

impl DateFilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateFilterKind::Sale => "sale",
            DateFilterKind::Operation => "operation",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "operation" => DateFilterKind::Operation,
            _ => DateFilterKind::Sale,
        }
    }
}

/// Filter parameters for listing commissions. A `None` leaves that
/// dimension unfiltered; the date range applies only when both ends parse.
#[derive(Debug, Clone, Default)]
pub struct CommissionFilters {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub date_kind: DateFilterKind,
    pub tour_id: Option<Uuid>,
    pub salesperson: Option<String>,
    pub external_agency: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub is_closed: Option<bool>,
    pub recipient_type: Option<String>,
    pub reservation_status: Option<String>,
}

/// Aggregates over the filtered commission set. Keys follow the
/// dashboard payload the back office consumes.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionSummary {
    pub total_sales: Decimal,
    pub total_costs: Decimal,
    pub total_net: Decimal,
    pub total_commissions: Decimal,
    pub pending_commissions: Decimal,
    pub paid_commissions: Decimal,
    pub average_commission_rate: Decimal,
    pub reservation_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourOption {
    pub id: String,
    pub name: String,
}

/// Distinct filter options appearing across the commission ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionUniqueValues {
    pub salespersons: Vec<String>,
    pub agencies: Vec<String>,
    pub tours: Vec<TourOption>,
}

/// Partial update for a commission row. Rate and amount edits are
/// rejected once the row is closed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCommissionRequest {
    pub status: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub commission_percentage: Option<Decimal>,
    pub commission_amount: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn commission_amount_is_percentage_of_net() {
        assert_eq!(compute_commission_amount(dec!(1000), dec!(10)), dec!(100));
        assert_eq!(compute_commission_amount(dec!(850), dec!(12.5)), dec!(106.25));
        assert_eq!(compute_commission_amount(dec!(0), dec!(10)), dec!(0));
    }

    #[test]
    fn status_transitions_follow_lifecycle() {
        use CommissionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Paid));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Approved));
    }

    #[test]
    fn status_parse_rejects_unknown_values() {
        assert_eq!(CommissionStatus::parse("approved"), Some(CommissionStatus::Approved));
        assert_eq!(CommissionStatus::parse("done"), None);
    }
}
