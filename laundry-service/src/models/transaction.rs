//! Ledger entry model. One entry per money event, never a running total.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money taken by collect / receive-payment.
    PaymentReceived,
    /// Money taken at order intake.
    Payment,
    Expense,
}

impl TransactionType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentReceived => "payment_received",
            Self::Payment => "payment",
            Self::Expense => "expense",
        }
    }
}

impl FromStr for TransactionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_received" => Ok(Self::PaymentReceived),
            "payment" => Ok(Self::Payment),
            "expense" => Ok(Self::Expense),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown transaction type '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub order_id: Option<Uuid>,
    pub transaction_type: String,
    pub amount: Decimal,
    pub payment_method: String,
    pub branch_id: Option<Uuid>,
    pub created_by: String,
    pub transaction_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Transaction {
    /// Get parsed transaction type.
    pub fn parsed_type(&self) -> Option<TransactionType> {
        self.transaction_type.parse().ok()
    }
}

/// Input for appending a ledger entry.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub order_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub payment_method: crate::models::PaymentMethod,
    pub branch_id: Option<Uuid>,
    pub created_by: String,
    pub notes: Option<String>,
}
