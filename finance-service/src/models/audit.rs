//! Append-only audit trail for ledger mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Close,
    Reopen,
    Adjust,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Close => "close",
            AuditAction::Reopen => "reopen",
            AuditAction::Adjust => "adjust",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntityType {
    Commission,
    OperatorPayment,
    Closing,
}

impl AuditEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntityType::Commission => "commission",
            AuditEntityType::OperatorPayment => "operator_payment",
            AuditEntityType::Closing => "closing",
        }
    }
}

/// Stored audit row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CommissionAuditLog {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub performed_by: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub closing_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for one audit row. Old/new snapshots carry just the fields the
/// action touched.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub entity_type: AuditEntityType,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub performed_by: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub closing_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewAuditEntry {
    pub fn new(entity_type: AuditEntityType, entity_id: Uuid, action: AuditAction) -> Self {
        Self {
            entity_type,
            entity_id,
            action,
            performed_by: None,
            booking_id: None,
            old_value: None,
            new_value: None,
            reason: None,
            closing_id: None,
            ip_address: None,
            user_agent: None,
        }
    }
}
