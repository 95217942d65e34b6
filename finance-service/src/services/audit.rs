//! Audit trail writer. Every ledger mutation records a row inside the
//! same transaction as the change itself, so the trail can never drift
//! from the data.

use crate::models::NewAuditEntry;
use service_core::error::AppError;
use sqlx::PgConnection;

pub(crate) async fn record_audit(
    conn: &mut PgConnection,
    entry: &NewAuditEntry,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO commission_audit_log (entity_type, entity_id, action, performed_by,
                                          booking_id, old_value, new_value, reason,
                                          closing_id, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(entry.entity_type.as_str())
    .bind(entry.entity_id)
    .bind(entry.action.as_str())
    .bind(entry.performed_by)
    .bind(entry.booking_id)
    .bind(entry.old_value.as_ref())
    .bind(entry.new_value.as_ref())
    .bind(entry.reason.as_deref())
    .bind(entry.closing_id)
    .bind(entry.ip_address.as_deref())
    .bind(entry.user_agent.as_deref())
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record audit entry: {}", e)))?;

    Ok(())
}
