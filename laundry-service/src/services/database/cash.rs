//! Daily cash figures, expenses, bank deposits and the per-day summary row.
//!
//! Writes touching one (branch, date) take a transaction-scoped advisory lock
//! on that pair first, so save, reconcile and the cash-affecting inserts for
//! the same day run one after another.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{commit, Database};
use crate::domain::money::round2;
use crate::domain::{BusinessCalendar, CashInputs, CashPosition};
use crate::models::{
    BankDeposit, DailyCashReport, DailyCashSummary, Expense, ManualAdjustments, NewBankDeposit,
    NewExpense, PaymentMethod, PaymentSource, SummaryState, TransactionType,
};
use crate::services::metrics::DB_QUERY_DURATION;

const SUMMARY_COLUMNS: &str = "summary_date, branch_id, opening_balance, cash_sales, book_sales, \
     card_sales, mobile_money_sales, bank_deposits, expenses_from_cash, expenses_from_bank, \
     expenses_from_mpesa, cash_in_hand, closing_balance, notes, is_reconciled, reconciled_by, \
     reconciled_utc, saved_by, updated_utc";

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

async fn lock_day(conn: &mut PgConnection, branch_id: Uuid, day: NaiveDate) -> Result<(), AppError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("cash:{}:{}", branch_id, day))
        .execute(&mut *conn)
        .await
        .map_err(db_error("Failed to lock cash day"))?;
    Ok(())
}

async fn find_summary(
    conn: &mut PgConnection,
    branch_id: Uuid,
    day: NaiveDate,
) -> Result<Option<DailyCashSummary>, AppError> {
    sqlx::query_as::<_, DailyCashSummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM daily_cash_summaries WHERE branch_id = $1 AND summary_date = $2"
    ))
    .bind(branch_id)
    .bind(day)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error("Failed to load daily summary"))
}

/// Reject writes into a day that is already reconciled.
async fn ensure_day_open(
    conn: &mut PgConnection,
    branch_id: Uuid,
    day: NaiveDate,
) -> Result<Option<DailyCashSummary>, AppError> {
    let existing = find_summary(conn, branch_id, day).await?;
    if existing.as_ref().is_some_and(|s| s.is_reconciled) {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Cash day {} for branch {} is already reconciled",
            day,
            branch_id
        )));
    }
    Ok(existing)
}

/// Sum every source figure for one branch-day.
async fn load_cash_inputs(
    conn: &mut PgConnection,
    calendar: &BusinessCalendar,
    branch_id: Uuid,
    day: NaiveDate,
) -> Result<CashInputs, AppError> {
    let (from, to) = calendar.day_range(day)?;

    let opening_balance = match day.checked_sub_signed(Duration::days(1)) {
        Some(previous) => find_summary(conn, branch_id, previous)
            .await?
            .map(|s| s.closing_balance)
            .unwrap_or(Decimal::ZERO),
        None => Decimal::ZERO,
    };

    // Cash taken at intake. Money received later is counted per method
    // below, so a line settled after an advance shows up in both figures.
    let cash_sales = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM transactions
        WHERE transaction_type = $1
          AND payment_method = $2
          AND branch_id = $3
          AND transaction_date >= $4 AND transaction_date < $5
        "#,
    )
    .bind(TransactionType::Payment.as_str())
    .bind(PaymentMethod::Cash.as_str())
    .bind(branch_id)
    .bind(from)
    .bind(to)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Failed to sum cash sales"))?;

    let received = sqlx::query_as::<_, (String, Decimal)>(
        r#"
        SELECT payment_method, COALESCE(SUM(amount), 0)
        FROM transactions
        WHERE transaction_type = $1
          AND branch_id = $2
          AND transaction_date >= $3 AND transaction_date < $4
        GROUP BY payment_method
        "#,
    )
    .bind(TransactionType::PaymentReceived.as_str())
    .bind(branch_id)
    .bind(from)
    .bind(to)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error("Failed to sum received payments"))?;

    let expenses = sqlx::query_as::<_, (String, Decimal)>(
        r#"
        SELECT payment_source, COALESCE(SUM(amount), 0)
        FROM expenses
        WHERE (branch_id = $1 OR branch_id IS NULL)
          AND expense_date = $2
        GROUP BY payment_source
        "#,
    )
    .bind(branch_id)
    .bind(day)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error("Failed to sum expenses"))?;

    let bank_deposits = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(amount), 0) FROM bank_deposits WHERE branch_id = $1 AND deposit_date = $2",
    )
    .bind(branch_id)
    .bind(day)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Failed to sum bank deposits"))?;

    let mut inputs = CashInputs {
        opening_balance,
        cash_sales: round2(cash_sales),
        bank_deposits: round2(bank_deposits),
        ..Default::default()
    };

    for (method, amount) in received {
        match method.parse::<PaymentMethod>()? {
            PaymentMethod::Cash => inputs.book_sales = round2(amount),
            PaymentMethod::Card => inputs.card_sales = round2(amount),
            PaymentMethod::MobileMoney => inputs.mobile_money_sales = round2(amount),
            PaymentMethod::Book => {}
        }
    }

    for (source, amount) in expenses {
        match source.parse::<PaymentSource>()? {
            PaymentSource::Cash => inputs.expenses_from_cash = round2(amount),
            PaymentSource::Bank => inputs.expenses_from_bank = round2(amount),
            PaymentSource::Mpesa => inputs.expenses_from_mpesa = round2(amount),
        }
    }

    Ok(inputs)
}

async fn upsert_summary(
    conn: &mut PgConnection,
    branch_id: Uuid,
    day: NaiveDate,
    position: &CashPosition,
    notes: Option<&str>,
    saved_by: &str,
) -> Result<DailyCashSummary, AppError> {
    sqlx::query_as::<_, DailyCashSummary>(&format!(
        r#"
        INSERT INTO daily_cash_summaries (
            summary_date, branch_id, opening_balance, cash_sales, book_sales, card_sales,
            mobile_money_sales, bank_deposits, expenses_from_cash, expenses_from_bank,
            expenses_from_mpesa, cash_in_hand, closing_balance, notes, saved_by, updated_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW())
        ON CONFLICT (summary_date, branch_id) DO UPDATE SET
            opening_balance = EXCLUDED.opening_balance,
            cash_sales = EXCLUDED.cash_sales,
            book_sales = EXCLUDED.book_sales,
            card_sales = EXCLUDED.card_sales,
            mobile_money_sales = EXCLUDED.mobile_money_sales,
            bank_deposits = EXCLUDED.bank_deposits,
            expenses_from_cash = EXCLUDED.expenses_from_cash,
            expenses_from_bank = EXCLUDED.expenses_from_bank,
            expenses_from_mpesa = EXCLUDED.expenses_from_mpesa,
            cash_in_hand = EXCLUDED.cash_in_hand,
            closing_balance = EXCLUDED.closing_balance,
            notes = COALESCE(EXCLUDED.notes, daily_cash_summaries.notes),
            saved_by = EXCLUDED.saved_by,
            updated_utc = NOW()
        WHERE daily_cash_summaries.is_reconciled = FALSE
        RETURNING {SUMMARY_COLUMNS}
        "#
    ))
    .bind(day)
    .bind(branch_id)
    .bind(position.opening_balance)
    .bind(position.cash_sales)
    .bind(position.book_sales)
    .bind(position.card_sales)
    .bind(position.mobile_money_sales)
    .bind(position.bank_deposits)
    .bind(position.expenses_from_cash)
    .bind(position.expenses_from_bank)
    .bind(position.expenses_from_mpesa)
    .bind(position.cash_in_hand)
    .bind(position.closing_balance)
    .bind(notes)
    .bind(saved_by)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error("Failed to save daily summary"))?
    .ok_or_else(|| {
        AppError::Conflict(anyhow::anyhow!(
            "Cash day {} for branch {} is already reconciled",
            day,
            branch_id
        ))
    })
}

impl Database {
    /// Current view of a branch-day. A reconciled day returns its stored
    /// row; any other day is recomputed from source data, with the card and
    /// mobile money figures of a saved row laid over it.
    #[instrument(skip(self, calendar), fields(branch_id = %branch_id, day = %day))]
    pub async fn daily_cash_report(
        &self,
        calendar: &BusinessCalendar,
        branch_id: Uuid,
        day: NaiveDate,
    ) -> Result<DailyCashReport, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["daily_cash_report"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;

        let stored = find_summary(&mut conn, branch_id, day).await?;
        let report = match stored {
            Some(summary) if summary.is_reconciled => DailyCashReport::from(summary),
            stored => {
                let inputs = load_cash_inputs(&mut conn, calendar, branch_id, day).await?;
                let computed = CashPosition::compute(inputs);
                let position = match &stored {
                    Some(saved) => computed.with_adjustments(&saved.adjustments())?,
                    None => computed,
                };
                DailyCashReport {
                    summary_date: day,
                    branch_id,
                    state: if stored.is_some() {
                        SummaryState::Saved
                    } else {
                        SummaryState::Computed
                    },
                    position,
                    notes: stored.and_then(|s| s.notes),
                    reconciled_by: None,
                    reconciled_utc: None,
                }
            }
        };

        timer.observe_duration();
        Ok(report)
    }

    /// Recompute and upsert the branch-day. Only the card / mobile money
    /// figures and notes come from the caller.
    #[instrument(skip(self, calendar, adjustments), fields(branch_id = %branch_id, day = %day))]
    pub async fn save_daily_summary(
        &self,
        calendar: &BusinessCalendar,
        branch_id: Uuid,
        day: NaiveDate,
        adjustments: &ManualAdjustments,
        saved_by: &str,
    ) -> Result<DailyCashSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_daily_summary"])
            .start_timer();

        let mut tx = self.begin().await?;
        lock_day(&mut tx, branch_id, day).await?;
        ensure_day_open(&mut tx, branch_id, day).await?;

        let inputs = load_cash_inputs(&mut tx, calendar, branch_id, day).await?;
        let position = CashPosition::compute(inputs).with_adjustments(adjustments)?;
        let summary = upsert_summary(
            &mut tx,
            branch_id,
            day,
            &position,
            adjustments.notes.as_deref(),
            saved_by,
        )
        .await?;

        commit(tx).await?;
        timer.observe_duration();

        info!(
            closing_balance = %summary.closing_balance,
            "Daily cash summary saved"
        );
        Ok(summary)
    }

    /// Lock the branch-day, saving it first when no row exists yet.
    #[instrument(skip(self, calendar), fields(branch_id = %branch_id, day = %day))]
    pub async fn reconcile_day(
        &self,
        calendar: &BusinessCalendar,
        branch_id: Uuid,
        day: NaiveDate,
        reconciled_by: &str,
    ) -> Result<DailyCashSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reconcile_day"])
            .start_timer();

        let mut tx = self.begin().await?;
        lock_day(&mut tx, branch_id, day).await?;

        if ensure_day_open(&mut tx, branch_id, day).await?.is_none() {
            let inputs = load_cash_inputs(&mut tx, calendar, branch_id, day).await?;
            upsert_summary(
                &mut tx,
                branch_id,
                day,
                &CashPosition::compute(inputs),
                None,
                reconciled_by,
            )
            .await?;
        }

        let summary = sqlx::query_as::<_, DailyCashSummary>(&format!(
            r#"
            UPDATE daily_cash_summaries
            SET is_reconciled = TRUE,
                reconciled_by = $3,
                reconciled_utc = NOW(),
                updated_utc = NOW()
            WHERE branch_id = $1 AND summary_date = $2
            RETURNING {SUMMARY_COLUMNS}
            "#
        ))
        .bind(branch_id)
        .bind(day)
        .bind(reconciled_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to reconcile daily summary"))?;

        commit(tx).await?;
        timer.observe_duration();

        info!(
            closing_balance = %summary.closing_balance,
            reconciled_by = %reconciled_by,
            "Cash day reconciled"
        );
        Ok(summary)
    }

    #[instrument(skip(self, expense), fields(branch_id = %branch_id, amount = %expense.amount))]
    pub async fn record_expense(
        &self,
        branch_id: Uuid,
        expense: &NewExpense,
        created_by: &str,
    ) -> Result<Expense, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_expense"])
            .start_timer();

        let mut tx = self.begin().await?;
        lock_day(&mut tx, branch_id, expense.expense_date).await?;
        ensure_day_open(&mut tx, branch_id, expense.expense_date).await?;

        let row = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (expense_id, branch_id, amount, payment_source, category, description, expense_date, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING expense_id, branch_id, amount, payment_source, category, description, expense_date, created_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(branch_id)
        .bind(round2(expense.amount))
        .bind(expense.payment_source.as_str())
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.expense_date)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to record expense"))?;

        commit(tx).await?;
        timer.observe_duration();

        info!(expense_id = %row.expense_id, source = %row.payment_source, "Expense recorded");
        Ok(row)
    }

    #[instrument(skip(self, deposit), fields(branch_id = %branch_id, amount = %deposit.amount))]
    pub async fn record_bank_deposit(
        &self,
        branch_id: Uuid,
        deposit: &NewBankDeposit,
        created_by: &str,
    ) -> Result<BankDeposit, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_bank_deposit"])
            .start_timer();

        let mut tx = self.begin().await?;
        lock_day(&mut tx, branch_id, deposit.deposit_date).await?;
        ensure_day_open(&mut tx, branch_id, deposit.deposit_date).await?;

        let row = sqlx::query_as::<_, BankDeposit>(
            r#"
            INSERT INTO bank_deposits (deposit_id, branch_id, amount, deposit_date, reference, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING deposit_id, branch_id, amount, deposit_date, reference, created_by, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(branch_id)
        .bind(round2(deposit.amount))
        .bind(deposit.deposit_date)
        .bind(&deposit.reference)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to record bank deposit"))?;

        commit(tx).await?;
        timer.observe_duration();

        info!(deposit_id = %row.deposit_id, "Bank deposit recorded");
        Ok(row)
    }
}
