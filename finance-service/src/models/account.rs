//! Payment accounts and transfers between them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountType {
    Checking,
    Savings,
    Cash,
    CreditCard,
    Investment,
    Other,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Cash => "cash",
            AccountType::CreditCard => "credit-card",
            AccountType::Investment => "investment",
            AccountType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checking" => Some(AccountType::Checking),
            "savings" => Some(AccountType::Savings),
            "cash" => Some(AccountType::Cash),
            "credit-card" => Some(AccountType::CreditCard),
            "investment" => Some(AccountType::Investment),
            "other" => Some(AccountType::Other),
            _ => None,
        }
    }
}

/// Payment account row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FinancialAccount {
    pub id: Uuid,
    pub name: String,
    pub account_type: String,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub currency: String,
    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/financial/accounts/`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub initial_balance: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `PUT /api/financial/accounts/{id}/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub account_type: Option<String>,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub currency: Option<String>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

/// Filter parameters for listing accounts.
#[derive(Debug, Clone, Default)]
pub struct AccountFilters {
    pub is_active: Option<bool>,
    pub currency: Option<String>,
}

/// Movement between two payment accounts. Completed transfers adjust
/// both balances when created.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankTransfer {
    pub id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub transfer_date: NaiveDate,
    pub status: String,
    pub reference: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/financial/transfers/`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub transfer_date: NaiveDate,
    #[serde(default)]
    pub reference: Option<String>,
}
