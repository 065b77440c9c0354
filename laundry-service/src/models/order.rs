//! Order line model. Lines sharing a receipt number make up one receipt.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Payment state of a line, always consistent with its paid/total relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotPaid,
    Advance,
    PaidFull,
}

impl PaymentStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPaid => "not_paid",
            Self::Advance => "advance",
            Self::PaidFull => "paid_full",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_paid" => Ok(Self::NotPaid),
            "advance" => Ok(Self::Advance),
            "paid_full" => Ok(Self::PaidFull),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown payment status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    Book,
}

impl PaymentMethod {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::MobileMoney => "mobile_money",
            Self::Book => "book",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "mobile_money" => Ok(Self::MobileMoney),
            "book" => Ok(Self::Book),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment method must be one of cash, card, mobile_money, book (got '{}')",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow status of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Ready,
    Collected,
}

impl OrderStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Collected => "collected",
        }
    }

    /// Workflow moves forward only, and `collected` is reached by collection alone.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        next != Self::Collected && next > *self
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "collected" => Ok(Self::Collected),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown order status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw `orders` row.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub order_id: Uuid,
    pub receipt_number: String,
    pub customer_id: Uuid,
    pub branch_id: Option<Uuid>,
    pub description: String,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_status: String,
    pub payment_method: String,
    pub status: String,
    pub order_date: DateTime<Utc>,
    pub ready_date: Option<DateTime<Utc>>,
    pub collected_date: Option<DateTime<Utc>>,
    pub created_by: String,
}

/// One sold service/item under a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: Uuid,
    pub receipt_number: String,
    pub customer_id: Uuid,
    /// `None` marks a legacy row that predates branch partitioning.
    pub branch_id: Option<Uuid>,
    pub description: String,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub ready_date: Option<DateTime<Utc>>,
    pub collected_date: Option<DateTime<Utc>>,
    pub created_by: String,
}

impl OrderLine {
    pub fn is_collected(&self) -> bool {
        self.status == OrderStatus::Collected
    }
}

impl TryFrom<OrderRow> for OrderLine {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            order_id: row.order_id,
            receipt_number: row.receipt_number,
            customer_id: row.customer_id,
            branch_id: row.branch_id,
            description: row.description,
            total_amount: row.total_amount,
            paid_amount: row.paid_amount,
            payment_status: row.payment_status.parse()?,
            payment_method: row.payment_method.parse()?,
            status: row.status.parse()?,
            order_date: row.order_date,
            ready_date: row.ready_date,
            collected_date: row.collected_date,
            created_by: row.created_by,
        })
    }
}

/// Input for one line of a new receipt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewOrderLine {
    #[validate(length(min = 1, max = 255))]
    pub description: String,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_status: PaymentStatus,
}

/// Input for order intake: N lines sold together under one receipt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReceipt {
    pub customer_id: Uuid,
    pub payment_method: PaymentMethod,
    #[validate(length(min = 1, max = 50), nested)]
    pub lines: Vec<NewOrderLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_rejects_unknown_values() {
        assert_eq!(
            "mobile_money".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::MobileMoney
        );
        let err = "cheque".parse::<PaymentMethod>().unwrap_err();
        assert!(err.to_string().contains("cash, card, mobile_money, book"));
    }

    #[test]
    fn order_status_orders_by_workflow() {
        assert!(OrderStatus::Pending < OrderStatus::Processing);
        assert!(OrderStatus::Ready < OrderStatus::Collected);
    }

    #[test]
    fn status_only_advances_and_never_to_collected() {
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Processing));
        assert!(OrderStatus::Pending.can_advance_to(OrderStatus::Ready));
        assert!(!OrderStatus::Ready.can_advance_to(OrderStatus::Processing));
        assert!(!OrderStatus::Ready.can_advance_to(OrderStatus::Ready));
        assert!(!OrderStatus::Ready.can_advance_to(OrderStatus::Collected));
        assert!(!OrderStatus::Collected.can_advance_to(OrderStatus::Ready));
    }
}
