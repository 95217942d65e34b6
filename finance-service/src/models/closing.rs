//! Closing batch model: an immutable settlement document grouping ledger
//! rows for one recipient over one period.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What kind of recipient a closing settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosingType {
    Salesperson,
    Agency,
    Operator,
}

impl ClosingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosingType::Salesperson => "salesperson",
            ClosingType::Agency => "agency",
            ClosingType::Operator => "operator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "salesperson" => Some(ClosingType::Salesperson),
            "agency" => Some(ClosingType::Agency),
            "operator" => Some(ClosingType::Operator),
            _ => None,
        }
    }

    /// Invoice number prefix for this closing type.
    pub fn invoice_prefix(&self) -> &'static str {
        match self {
            ClosingType::Salesperson => "COM",
            ClosingType::Agency => "AGY",
            ClosingType::Operator => "OPR",
        }
    }
}

impl std::fmt::Display for ClosingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invoice numbers look like COM-2026-000042: prefix, year, then a
/// zero-padded sequence that never resets within the year.
pub fn format_invoice_number(closing_type: ClosingType, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:06}", closing_type.invoice_prefix(), year, sequence)
}

/// Closing header row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CommissionClosing {
    pub id: Uuid,
    pub closing_type: String,
    pub recipient_name: String,
    pub recipient_id: Option<Uuid>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_amount: Decimal,
    pub currency: String,
    pub item_count: i32,
    pub invoice_number: String,
    pub invoice_file: Option<String>,
    pub expense_id: Option<Uuid>,
    pub is_active: bool,
    pub undone_at: Option<DateTime<Utc>>,
    pub undone_by: Option<Uuid>,
    pub undo_reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/commissions/close/`.
#[derive(Debug, Clone, Deserialize)]
pub struct CloseCommissionsRequest {
    pub commission_ids: Vec<Uuid>,
    pub closing_type: String,
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub currency: String,
    #[serde(default)]
    pub adjustments: Option<HashMap<Uuid, Decimal>>,
}

/// Body of `POST /api/operators/close/`.
#[derive(Debug, Clone, Deserialize)]
pub struct CloseOperatorPaymentsRequest {
    pub operator_payment_ids: Vec<Uuid>,
    pub closing_type: String,
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_id: Option<Uuid>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub currency: String,
    #[serde(default)]
    pub adjustments: Option<HashMap<Uuid, Decimal>>,
}

/// Body of `POST /api/commissions/closings/{id}/undo/`.
#[derive(Debug, Clone, Deserialize)]
pub struct UndoClosingRequest {
    #[serde(default)]
    pub reason: String,
}

/// Filter parameters for listing closings.
#[derive(Debug, Clone, Default)]
pub struct ClosingFilters {
    pub closing_type: Option<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_numbers_carry_type_prefix_and_padding() {
        assert_eq!(
            format_invoice_number(ClosingType::Salesperson, 2026, 1),
            "COM-2026-000001"
        );
        assert_eq!(
            format_invoice_number(ClosingType::Agency, 2026, 42),
            "AGY-2026-000042"
        );
        assert_eq!(
            format_invoice_number(ClosingType::Operator, 2027, 123456),
            "OPR-2027-123456"
        );
    }

    #[test]
    fn closing_type_parse_round_trips() {
        for t in [ClosingType::Salesperson, ClosingType::Agency, ClosingType::Operator] {
            assert_eq!(ClosingType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ClosingType::parse("vendor"), None);
    }
}
