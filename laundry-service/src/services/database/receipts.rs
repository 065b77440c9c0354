//! Order lines and receipt-level payment writes.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::audit::insert_audit_entry;
use super::ledger::{find_recent_duplicate, insert_transaction};
use super::{commit, Database, ORDER_COLUMNS};
use crate::domain::integrity::check_receipt;
use crate::domain::money::round2;
use crate::domain::receipt_number::MAX_ATTEMPTS;
use crate::domain::{
    BranchScope, DuplicateWindow, IntegrityWarning, PaymentPlan, Receipt, ReceiptNumberGenerator,
    ReceiptSummary,
};
use crate::models::{
    AuditAction, CreateReceipt, NewAuditEntry, NewTransaction, OrderLine, OrderRow, OrderStatus,
    Transaction, TransactionType,
};
use crate::services::metrics::{record_duplicate_payment, DB_QUERY_DURATION};

/// Result of a committed collect / receive-payment.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub plan: PaymentPlan,
    pub receipt: ReceiptSummary,
    pub transaction: Option<Transaction>,
}

/// A committed workflow status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub line: OrderLine,
    pub previous: OrderStatus,
    /// The line had no branch and was adopted into the actor's.
    pub adopted: bool,
}

fn to_lines(rows: Vec<OrderRow>) -> Result<Vec<OrderLine>, AppError> {
    rows.into_iter().map(OrderLine::try_from).collect()
}

async fn reserve_receipt_number(
    conn: &mut PgConnection,
    numbers: &ReceiptNumberGenerator,
    branch_id: Uuid,
    business_day: NaiveDate,
) -> Result<String, AppError> {
    for attempt in 1..=MAX_ATTEMPTS {
        let candidate = numbers.generate(business_day);
        let reserved = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO receipt_numbers (receipt_number, branch_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING receipt_number
            "#,
        )
        .bind(&candidate)
        .bind(branch_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to reserve receipt number: {}", e))
        })?;

        match reserved {
            Some(number) => return Ok(number),
            None => warn!(attempt, receipt_number = %candidate, "Receipt number collision"),
        }
    }

    Err(AppError::InternalError(anyhow::anyhow!(
        "Could not allocate a unique receipt number after {} attempts",
        MAX_ATTEMPTS
    )))
}

/// Load every line of a receipt, optionally holding row locks until commit.
async fn load_receipt(
    conn: &mut PgConnection,
    scope: &BranchScope,
    receipt_number: &str,
    for_update: bool,
) -> Result<Receipt, AppError> {
    let sql = format!(
        r#"
        SELECT {ORDER_COLUMNS}
        FROM orders
        WHERE receipt_number = $1
          AND ($2::uuid IS NULL OR branch_id = $2)
        ORDER BY order_date, order_id
        {}
        "#,
        if for_update { "FOR UPDATE" } else { "" }
    );

    let rows = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(receipt_number)
        .bind(scope.filter())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load receipt: {}", e)))?;

    if rows.is_empty() {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Receipt {} not found",
            receipt_number
        )));
    }

    Receipt::new(to_lines(rows)?)
}

impl Database {
    /// Insert a new receipt: reserved number, N lines, the intake ledger entry
    /// when money was taken, and a `created` audit row per line.
    #[instrument(skip(self, request, numbers), fields(branch_id = %branch_id, lines = request.lines.len()))]
    pub async fn create_receipt(
        &self,
        branch_id: Uuid,
        created_by: &str,
        request: &CreateReceipt,
        paid_total: Decimal,
        numbers: &ReceiptNumberGenerator,
        business_day: NaiveDate,
    ) -> Result<(Receipt, Option<Transaction>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_receipt"])
            .start_timer();

        let mut tx = self.begin().await?;
        let receipt_number =
            reserve_receipt_number(&mut tx, numbers, branch_id, business_day).await?;
        let now = Utc::now();

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let row = sqlx::query_as::<_, OrderRow>(&format!(
                r#"
                INSERT INTO orders (order_id, receipt_number, customer_id, branch_id, description, total_amount, paid_amount, payment_status, payment_method, status, order_date, created_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                RETURNING {ORDER_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(&receipt_number)
            .bind(request.customer_id)
            .bind(branch_id)
            .bind(&line.description)
            .bind(round2(line.total_amount))
            .bind(round2(line.paid_amount))
            .bind(line.payment_status.as_str())
            .bind(request.payment_method.as_str())
            .bind(OrderStatus::Pending.as_str())
            .bind(now)
            .bind(created_by)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert order line: {}", e)))?;
            lines.push(OrderLine::try_from(row)?);
        }

        let receipt = Receipt::new(lines)?;
        let anchor = receipt.lines()[0].order_id;

        let transaction = if paid_total > Decimal::ZERO {
            let entry = NewTransaction {
                order_id: Some(anchor),
                transaction_type: TransactionType::Payment,
                amount: paid_total,
                payment_method: request.payment_method,
                branch_id: Some(branch_id),
                created_by: created_by.to_string(),
                notes: Some(format!("Receipt {} intake", receipt_number)),
            };
            Some(insert_transaction(&mut tx, &entry, now).await?)
        } else {
            None
        };

        for line in receipt.lines() {
            let entry = NewAuditEntry {
                order_id: line.order_id,
                action: AuditAction::Created,
                old_payment_status: None,
                new_payment_status: Some(line.payment_status),
                old_paid_amount: None,
                new_paid_amount: Some(line.paid_amount),
                old_payment_method: None,
                new_payment_method: Some(line.payment_method),
                notes: Some(format!("Receipt {} created", receipt_number)),
            };
            insert_audit_entry(&mut tx, &entry, created_by).await?;
        }

        commit(tx).await?;
        timer.observe_duration();

        info!(
            receipt_number = %receipt_number,
            total = %receipt.total(),
            paid = %paid_total,
            "Receipt created"
        );

        Ok((receipt, transaction))
    }

    /// Read a receipt without locking.
    #[instrument(skip(self))]
    pub async fn get_receipt(
        &self,
        scope: &BranchScope,
        receipt_number: &str,
    ) -> Result<Receipt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_receipt"])
            .start_timer();

        let mut conn = self.pool.acquire().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
        })?;
        let receipt = load_receipt(&mut conn, scope, receipt_number, false).await?;

        timer.observe_duration();
        Ok(receipt)
    }

    /// Lock every line of the receipt, let `plan` decide against the locked
    /// state, then write ledger entry, line updates and audit rows in one
    /// transaction.
    #[instrument(skip(self, window, plan), fields(receipt_number = %receipt_number))]
    pub async fn apply_payment<F>(
        &self,
        scope: &BranchScope,
        receipt_number: &str,
        actor: &str,
        window: &DuplicateWindow,
        plan: F,
    ) -> Result<PaymentOutcome, AppError>
    where
        F: FnOnce(&Receipt) -> Result<PaymentPlan, AppError>,
    {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_payment"])
            .start_timer();

        let mut tx = self.begin().await?;
        let receipt = load_receipt(&mut tx, scope, receipt_number, true).await?;
        let plan = plan(&receipt)?;
        let now = Utc::now();

        let transaction = match plan.ledger_amount {
            Some(amount) => {
                if let Some(prior) =
                    find_recent_duplicate(&mut tx, window, plan.anchor_order_id, amount, now)
                        .await?
                {
                    record_duplicate_payment(plan.action.as_str());
                    warn!(
                        prior_transaction_id = %prior.transaction_id,
                        amount = %amount,
                        "Duplicate payment rejected"
                    );
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Duplicate payment: {} was already received for receipt {} at {} (transaction {})",
                        amount,
                        receipt_number,
                        prior.transaction_date,
                        prior.transaction_id
                    )));
                }

                let entry = NewTransaction {
                    order_id: Some(plan.anchor_order_id),
                    transaction_type: TransactionType::PaymentReceived,
                    amount,
                    payment_method: plan.payment_method,
                    branch_id: receipt.branch_id(),
                    created_by: actor.to_string(),
                    notes: Some(format!("Receipt {} {}", receipt_number, plan.action)),
                };
                Some(insert_transaction(&mut tx, &entry, now).await?)
            }
            None => None,
        };

        for update in &plan.line_updates {
            sqlx::query(
                r#"
                UPDATE orders
                SET paid_amount = $2,
                    payment_status = $3,
                    payment_method = $4,
                    status = CASE WHEN $5 THEN 'collected' ELSE status END,
                    collected_date = CASE WHEN $5 THEN $6 ELSE collected_date END
                WHERE order_id = $1
                "#,
            )
            .bind(update.order_id)
            .bind(update.new_paid_amount)
            .bind(update.new_payment_status.as_str())
            .bind(update.new_payment_method.as_str())
            .bind(plan.collect)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update order line: {}", e)))?;
        }

        let transaction_id = transaction.as_ref().map(|t| t.transaction_id);
        for entry in plan.audit_entries(transaction_id) {
            insert_audit_entry(&mut tx, &entry, actor).await?;
        }

        let updated = load_receipt(&mut tx, scope, receipt_number, false).await?;
        commit(tx).await?;
        timer.observe_duration();

        info!(
            action = %plan.action,
            payment_status = %plan.resulting_status,
            amount = ?plan.ledger_amount,
            "Receipt payment applied"
        );

        Ok(PaymentOutcome {
            plan,
            receipt: updated.summary(),
            transaction,
        })
    }

    /// Move one line forward through pending → processing → ready.
    ///
    /// A legacy line without a branch is adopted into the scope's branch.
    /// `gate` sees the branch the line will belong to after the update.
    #[instrument(skip(self, gate), fields(order_id = %order_id, next = %next))]
    pub async fn update_order_status<F>(
        &self,
        scope: &BranchScope,
        order_id: Uuid,
        next: OrderStatus,
        actor: &str,
        gate: F,
    ) -> Result<StatusChange, AppError>
    where
        F: FnOnce(Option<Uuid>) -> Result<(), AppError>,
    {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_order_status"])
            .start_timer();

        let mut tx = self.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load order: {}", e)))?;

        let current = match row {
            Some(row) => OrderLine::try_from(row)?,
            None => {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Order {} not found",
                    order_id
                )))
            }
        };

        let adopt = scope.adoption_target(current.branch_id);
        if adopt.is_none() && !scope.allows(current.branch_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Order {} not found",
                order_id
            )));
        }

        gate(adopt.or(current.branch_id))?;

        if !current.status.can_advance_to(next) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Order {} cannot move from {} to {}",
                order_id,
                current.status,
                next
            )));
        }

        let ready_date: Option<DateTime<Utc>> = (next == OrderStatus::Ready).then(Utc::now);
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE orders
            SET status = $2,
                ready_date = COALESCE($3, ready_date),
                branch_id = COALESCE(branch_id, $4)
            WHERE order_id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id)
        .bind(next.as_str())
        .bind(ready_date)
        .bind(adopt)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update order status: {}", e)))?;
        let line = OrderLine::try_from(row)?;

        let mut notes = format!("Status {} -> {}", current.status, next);
        if let Some(branch_id) = adopt {
            notes.push_str(&format!("; adopted into branch {}", branch_id));
        }
        let entry = NewAuditEntry {
            order_id,
            action: AuditAction::StatusChanged,
            old_payment_status: None,
            new_payment_status: None,
            old_paid_amount: None,
            new_paid_amount: None,
            old_payment_method: None,
            new_payment_method: None,
            notes: Some(notes),
        };
        insert_audit_entry(&mut tx, &entry, actor).await?;

        commit(tx).await?;
        timer.observe_duration();

        if adopt.is_some() {
            info!(branch_id = ?line.branch_id, "Legacy order adopted into branch");
        }

        Ok(StatusChange {
            line,
            previous: current.status,
            adopted: adopt.is_some(),
        })
    }

    /// Compare ledger and line figures for every receipt with lines ordered
    /// inside `[from, to)`.
    #[instrument(skip(self))]
    pub async fn audit_integrity(
        &self,
        scope: &BranchScope,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IntegrityWarning>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["audit_integrity"])
            .start_timer();

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE order_date >= $1 AND order_date < $2
              AND ($3::uuid IS NULL OR branch_id = $3)
            ORDER BY receipt_number, order_date, order_id
            "#
        ))
        .bind(from)
        .bind(to)
        .bind(scope.filter())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load orders: {}", e)))?;

        let mut receipts: BTreeMap<String, Vec<OrderLine>> = BTreeMap::new();
        for line in to_lines(rows)? {
            receipts
                .entry(line.receipt_number.clone())
                .or_default()
                .push(line);
        }

        let order_ids: Vec<Uuid> = receipts.values().flatten().map(|l| l.order_id).collect();
        let owner: HashMap<Uuid, &str> = receipts
            .iter()
            .flat_map(|(number, lines)| lines.iter().map(move |l| (l.order_id, number.as_str())))
            .collect();

        let mut entries: HashMap<&str, Vec<Transaction>> = HashMap::new();
        for entry in self.transactions_for_orders(&order_ids).await? {
            if let Some(number) = entry.order_id.and_then(|id| owner.get(&id)) {
                entries.entry(*number).or_default().push(entry);
            }
        }

        let warnings: Vec<IntegrityWarning> = receipts
            .iter()
            .filter_map(|(number, lines)| {
                let ledger = entries.get(number.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                check_receipt(number, lines, ledger)
            })
            .collect();

        timer.observe_duration();
        for w in &warnings {
            warn!(
                receipt_number = %w.receipt_number,
                ledger_total = %w.ledger_total,
                lines_paid = %w.lines_paid,
                "Ledger and line figures disagree"
            );
        }
        Ok(warnings)
    }
}
