//! Company expense model, including the auto-created rows that back
//! commission closings.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseType {
    Fixed,
    Variable,
}

impl ExpenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseType::Fixed => "fixed",
            ExpenseType::Variable => "variable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(ExpenseType::Fixed),
            "variable" => Some(ExpenseType::Variable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpenseCategory {
    Salary,
    Rent,
    Utilities,
    Marketing,
    Supplies,
    Transportation,
    Insurance,
    Maintenance,
    Software,
    ProfessionalServices,
    Taxes,
    Commission,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Salary => "salary",
            ExpenseCategory::Rent => "rent",
            ExpenseCategory::Utilities => "utilities",
            ExpenseCategory::Marketing => "marketing",
            ExpenseCategory::Supplies => "supplies",
            ExpenseCategory::Transportation => "transportation",
            ExpenseCategory::Insurance => "insurance",
            ExpenseCategory::Maintenance => "maintenance",
            ExpenseCategory::Software => "software",
            ExpenseCategory::ProfessionalServices => "professional-services",
            ExpenseCategory::Taxes => "taxes",
            ExpenseCategory::Commission => "commission",
            ExpenseCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "salary" => Some(ExpenseCategory::Salary),
            "rent" => Some(ExpenseCategory::Rent),
            "utilities" => Some(ExpenseCategory::Utilities),
            "marketing" => Some(ExpenseCategory::Marketing),
            "supplies" => Some(ExpenseCategory::Supplies),
            "transportation" => Some(ExpenseCategory::Transportation),
            "insurance" => Some(ExpenseCategory::Insurance),
            "maintenance" => Some(ExpenseCategory::Maintenance),
            "software" => Some(ExpenseCategory::Software),
            "professional-services" => Some(ExpenseCategory::ProfessionalServices),
            "taxes" => Some(ExpenseCategory::Taxes),
            "commission" => Some(ExpenseCategory::Commission),
            "other" => Some(ExpenseCategory::Other),
            _ => None,
        }
    }

    /// Variable-cost categories that count as direct (per-trip) costs in
    /// the income statement.
    pub fn is_direct_cost(&self) -> bool {
        matches!(
            self,
            ExpenseCategory::Transportation | ExpenseCategory::Supplies | ExpenseCategory::Maintenance
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpensePaymentStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl ExpensePaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpensePaymentStatus::Pending => "pending",
            ExpensePaymentStatus::Paid => "paid",
            ExpensePaymentStatus::Overdue => "overdue",
            ExpensePaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExpensePaymentStatus::Pending),
            "paid" => Some(ExpensePaymentStatus::Paid),
            "overdue" => Some(ExpensePaymentStatus::Overdue),
            "cancelled" => Some(ExpensePaymentStatus::Cancelled),
            _ => None,
        }
    }
}

/// Expense row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub name: String,
    pub expense_type: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub recurrence: String,
    pub recurrence_end_date: Option<NaiveDate>,
    pub vendor: Option<String>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Pending past the due date counts as overdue even before the
    /// status field catches up.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.payment_status == ExpensePaymentStatus::Pending.as_str() && self.due_date < today
    }
}

fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_not_positive"));
    }
    Ok(())
}

/// Body of `POST /api/financial/expenses/`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateExpenseRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub expense_type: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(custom(function = "validate_positive_amount"))]
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub recurrence: Option<String>,
    #[serde(default)]
    pub recurrence_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `PUT /api/financial/expenses/{id}/`. Absent fields keep their
/// stored values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateExpenseRequest {
    pub name: Option<String>,
    pub expense_type: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub recurrence: Option<String>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub vendor: Option<String>,
    pub invoice_number: Option<String>,
    pub notes: Option<String>,
}

/// Filter parameters for listing expenses.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilters {
    pub expense_type: Option<String>,
    pub category: Option<String>,
    pub payment_status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category: String,
    pub total: Decimal,
    pub count: i64,
}

/// Aggregates for the expense dashboard card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseSummary {
    pub total_pending: Decimal,
    pub total_paid: Decimal,
    pub total_overdue: Decimal,
    pub fixed_expenses: Decimal,
    pub variable_expenses: Decimal,
    pub by_category: Vec<CategoryBreakdown>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pending_past_due_is_overdue() {
        let expense = Expense {
            id: Uuid::new_v4(),
            name: "Office rent".into(),
            expense_type: "fixed".into(),
            category: "rent".into(),
            description: None,
            amount: dec!(500000),
            currency: "CLP".into(),
            payment_status: "pending".into(),
            payment_method: None,
            payment_date: None,
            due_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            recurrence: "monthly".into(),
            recurrence_end_date: None,
            vendor: None,
            invoice_number: None,
            notes: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(expense.is_overdue(NaiveDate::from_ymd_opt(2026, 1, 11).unwrap()));
        assert!(!expense.is_overdue(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()));
    }

    #[test]
    fn direct_cost_categories() {
        assert!(ExpenseCategory::Transportation.is_direct_cost());
        assert!(ExpenseCategory::Supplies.is_direct_cost());
        assert!(ExpenseCategory::Maintenance.is_direct_cost());
        assert!(!ExpenseCategory::Rent.is_direct_cost());
        assert!(!ExpenseCategory::Commission.is_direct_cost());
    }

    #[test]
    fn create_request_rejects_non_positive_amounts() {
        let request = CreateExpenseRequest {
            name: "Fuel".into(),
            expense_type: None,
            category: None,
            description: None,
            amount: dec!(0),
            currency: None,
            payment_status: None,
            payment_method: None,
            payment_date: None,
            due_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            recurrence: None,
            recurrence_end_date: None,
            vendor: None,
            invoice_number: None,
            notes: None,
        };
        assert!(request.validate().is_err());
    }
}
