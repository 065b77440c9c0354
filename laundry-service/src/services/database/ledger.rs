//! Append-only transaction ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

use super::Database;
use crate::domain::DuplicateWindow;
use crate::models::{NewTransaction, Transaction, TransactionType};
use crate::services::metrics::DB_QUERY_DURATION;

const TRANSACTION_COLUMNS: &str = "transaction_id, order_id, transaction_type, amount, \
     payment_method, branch_id, created_by, transaction_date, notes";

/// Append one ledger entry on the caller's connection.
#[instrument(skip(conn, entry), fields(transaction_type = %entry.transaction_type, amount = %entry.amount))]
pub(super) async fn insert_transaction(
    conn: &mut PgConnection,
    entry: &NewTransaction,
    at: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["insert_transaction"])
        .start_timer();

    let transaction = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        INSERT INTO transactions (transaction_id, order_id, transaction_type, amount, payment_method, branch_id, created_by, transaction_date, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(entry.order_id)
    .bind(entry.transaction_type.as_str())
    .bind(entry.amount)
    .bind(entry.payment_method.as_str())
    .bind(entry.branch_id)
    .bind(&entry.created_by)
    .bind(at)
    .bind(&entry.notes)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert transaction: {}", e)))?;

    timer.observe_duration();
    info!(transaction_id = %transaction.transaction_id, "Ledger entry appended");
    Ok(transaction)
}

/// Look for an earlier `payment_received` entry that this payment repeats.
pub(super) async fn find_recent_duplicate(
    conn: &mut PgConnection,
    window: &DuplicateWindow,
    order_id: Uuid,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Option<Transaction>, AppError> {
    let timer = DB_QUERY_DURATION
        .with_label_values(&["find_recent_duplicate"])
        .start_timer();

    let (from, to) = window.bounds(now);
    let candidates = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM transactions
        WHERE order_id = $1
          AND transaction_type = $2
          AND amount = $3
          AND transaction_date BETWEEN $4 AND $5
        ORDER BY transaction_date DESC
        "#
    ))
    .bind(order_id)
    .bind(TransactionType::PaymentReceived.as_str())
    .bind(amount)
    .bind(from)
    .bind(to)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to check duplicate payment: {}", e))
    })?;

    timer.observe_duration();
    Ok(candidates
        .into_iter()
        .find(|t| window.matches(t, order_id, amount, now)))
}

impl Database {
    /// Ledger entries attached to any of the given lines.
    #[instrument(skip(self, order_ids), fields(orders = order_ids.len()))]
    pub async fn transactions_for_orders(
        &self,
        order_ids: &[Uuid],
    ) -> Result<Vec<Transaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transactions_for_orders"])
            .start_timer();

        let entries = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE order_id = ANY($1)
            ORDER BY transaction_date, transaction_id
            "#
        ))
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list transactions: {}", e)))?;

        timer.observe_duration();
        Ok(entries)
    }
}
