//! Payment audit log model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    PaymentReceived,
    Collected,
    Updated,
    StatusChanged,
}

impl AuditAction {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PaymentReceived => "payment_received",
            Self::Collected => "collected",
            Self::Updated => "updated",
            Self::StatusChanged => "status_changed",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable audit row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentAuditEntry {
    pub audit_id: Uuid,
    pub order_id: Uuid,
    pub action: String,
    pub old_payment_status: Option<String>,
    pub new_payment_status: Option<String>,
    pub old_paid_amount: Option<Decimal>,
    pub new_paid_amount: Option<Decimal>,
    pub old_payment_method: Option<String>,
    pub new_payment_method: Option<String>,
    pub changed_by: String,
    pub changed_utc: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Before/after values of one line's payment fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub order_id: Uuid,
    pub action: AuditAction,
    pub old_payment_status: Option<PaymentStatus>,
    pub new_payment_status: Option<PaymentStatus>,
    pub old_paid_amount: Option<Decimal>,
    pub new_paid_amount: Option<Decimal>,
    pub old_payment_method: Option<PaymentMethod>,
    pub new_payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
}
