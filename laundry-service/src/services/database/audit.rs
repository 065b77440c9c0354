//! Payment audit log. Rows are only ever inserted.

use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::domain::BranchScope;
use crate::models::{NewAuditEntry, PaymentAuditEntry};
use crate::services::metrics::DB_QUERY_DURATION;

pub(super) async fn insert_audit_entry(
    conn: &mut PgConnection,
    entry: &NewAuditEntry,
    changed_by: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO payment_audit_log (
            audit_id, order_id, action,
            old_payment_status, new_payment_status,
            old_paid_amount, new_paid_amount,
            old_payment_method, new_payment_method,
            changed_by, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(entry.order_id)
    .bind(entry.action.as_str())
    .bind(entry.old_payment_status.map(|s| s.as_str()))
    .bind(entry.new_payment_status.map(|s| s.as_str()))
    .bind(entry.old_paid_amount)
    .bind(entry.new_paid_amount)
    .bind(entry.old_payment_method.map(|m| m.as_str()))
    .bind(entry.new_payment_method.map(|m| m.as_str()))
    .bind(changed_by)
    .bind(&entry.notes)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to write audit entry: {}", e)))?;

    Ok(())
}

impl Database {
    /// Audit trail of one line, oldest first.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn order_audit_trail(
        &self,
        scope: &BranchScope,
        order_id: Uuid,
    ) -> Result<Vec<PaymentAuditEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["order_audit_trail"])
            .start_timer();

        let branch = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT branch_id FROM orders WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load order: {}", e)))?;

        match branch {
            Some(branch_id) if scope.allows(branch_id) => {}
            _ => {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Order {} not found",
                    order_id
                )))
            }
        }

        let entries = sqlx::query_as::<_, PaymentAuditEntry>(
            r#"
            SELECT audit_id, order_id, action, old_payment_status, new_payment_status,
                   old_paid_amount, new_paid_amount, old_payment_method, new_payment_method,
                   changed_by, changed_utc, notes
            FROM payment_audit_log
            WHERE order_id = $1
            ORDER BY changed_utc, audit_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load audit trail: {}", e)))?;

        timer.observe_duration();
        Ok(entries)
    }
}
