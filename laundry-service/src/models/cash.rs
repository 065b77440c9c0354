//! Expense, bank deposit and daily cash summary models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::domain::cash::CashPosition;

/// Where an expense was paid from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSource {
    Cash,
    Bank,
    Mpesa,
}

impl PaymentSource {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Bank => "bank",
            Self::Mpesa => "mpesa",
        }
    }
}

impl FromStr for PaymentSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "bank" => Ok(Self::Bank),
            "mpesa" => Ok(Self::Mpesa),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown payment source '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Expense {
    pub expense_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_source: String,
    pub category: String,
    pub description: String,
    pub expense_date: NaiveDate,
    pub created_by: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewExpense {
    pub amount: Decimal,
    pub payment_source: PaymentSource,
    #[validate(length(min = 1, max = 64))]
    pub category: String,
    #[validate(length(max = 1000))]
    pub description: String,
    pub expense_date: NaiveDate,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankDeposit {
    pub deposit_id: Uuid,
    pub branch_id: Uuid,
    pub amount: Decimal,
    pub deposit_date: NaiveDate,
    pub reference: Option<String>,
    pub created_by: String,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewBankDeposit {
    pub amount: Decimal,
    pub deposit_date: NaiveDate,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
}

/// Persisted `daily_cash_summaries` row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DailyCashSummary {
    pub summary_date: NaiveDate,
    pub branch_id: Uuid,
    pub opening_balance: Decimal,
    pub cash_sales: Decimal,
    pub book_sales: Decimal,
    pub card_sales: Decimal,
    pub mobile_money_sales: Decimal,
    pub bank_deposits: Decimal,
    pub expenses_from_cash: Decimal,
    pub expenses_from_bank: Decimal,
    pub expenses_from_mpesa: Decimal,
    pub cash_in_hand: Decimal,
    pub closing_balance: Decimal,
    pub notes: Option<String>,
    pub is_reconciled: bool,
    pub reconciled_by: Option<String>,
    pub reconciled_utc: Option<DateTime<Utc>>,
    pub saved_by: String,
    pub updated_utc: DateTime<Utc>,
}

impl DailyCashSummary {
    /// Stored figures as a cash position.
    pub fn position(&self) -> CashPosition {
        CashPosition {
            opening_balance: self.opening_balance,
            cash_sales: self.cash_sales,
            book_sales: self.book_sales,
            card_sales: self.card_sales,
            mobile_money_sales: self.mobile_money_sales,
            bank_deposits: self.bank_deposits,
            expenses_from_cash: self.expenses_from_cash,
            expenses_from_bank: self.expenses_from_bank,
            expenses_from_mpesa: self.expenses_from_mpesa,
            cash_in_hand: self.cash_in_hand,
            closing_balance: self.closing_balance,
        }
    }

    /// Settlement figures recorded by the last save.
    pub fn adjustments(&self) -> ManualAdjustments {
        ManualAdjustments {
            card_sales: Some(self.card_sales),
            mobile_money_sales: Some(self.mobile_money_sales),
            notes: self.notes.clone(),
        }
    }
}

/// Lifecycle of a (branch, date) summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryState {
    /// Figures computed on read, nothing persisted.
    Computed,
    Saved,
    /// Terminal; the stored row is locked.
    Reconciled,
}

/// Result of reading a branch-day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCashReport {
    pub summary_date: NaiveDate,
    pub branch_id: Uuid,
    pub state: SummaryState,
    pub position: CashPosition,
    pub notes: Option<String>,
    pub reconciled_by: Option<String>,
    pub reconciled_utc: Option<DateTime<Utc>>,
}

impl From<DailyCashSummary> for DailyCashReport {
    fn from(s: DailyCashSummary) -> Self {
        Self {
            summary_date: s.summary_date,
            branch_id: s.branch_id,
            state: if s.is_reconciled {
                SummaryState::Reconciled
            } else {
                SummaryState::Saved
            },
            position: s.position(),
            notes: s.notes,
            reconciled_by: s.reconciled_by,
            reconciled_utc: s.reconciled_utc,
        }
    }
}

/// Caller-supplied figures a save may carry. Everything else is recomputed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ManualAdjustments {
    /// Card / bank settlement figure as reported by the terminal statement.
    pub card_sales: Option<Decimal>,
    /// Mobile money figure as reported by the provider statement.
    pub mobile_money_sales: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Reconciliation result. `report_sent` is a soft flag; reconciliation has
/// committed regardless of its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub summary: DailyCashSummary,
    pub report_sent: bool,
}
