//! Duplicate payment detection.
//!
//! Best-effort: two submissions racing inside the window can both pass the
//! lookup. The receipt row locks are what keep such a race from overpaying.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::money::round2;
use crate::models::{Transaction, TransactionType};

pub const DUPLICATE_WINDOW_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct DuplicateWindow {
    half_width: Duration,
}

impl Default for DuplicateWindow {
    fn default() -> Self {
        Self {
            half_width: Duration::seconds(DUPLICATE_WINDOW_SECONDS),
        }
    }
}

impl DuplicateWindow {
    /// Inclusive `[now - w, now + w]` bounds for the ledger lookup.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.half_width, now + self.half_width)
    }

    /// Same order, same amount, `payment_received`, inside the window.
    pub fn matches(
        &self,
        prior: &Transaction,
        order_id: Uuid,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        let (from, to) = self.bounds(now);
        prior.order_id == Some(order_id)
            && prior.parsed_type() == Some(TransactionType::PaymentReceived)
            && round2(prior.amount) == round2(amount)
            && prior.transaction_date >= from
            && prior.transaction_date <= to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn entry(order_id: Uuid, amount: &str, at: DateTime<Utc>, kind: TransactionType) -> Transaction {
        Transaction {
            transaction_id: Uuid::new_v4(),
            order_id: Some(order_id),
            transaction_type: kind.as_str().to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            payment_method: "cash".to_string(),
            branch_id: None,
            created_by: "clerk".to_string(),
            transaction_date: at,
            notes: None,
        }
    }

    #[test]
    fn same_payment_within_a_minute_is_a_duplicate() {
        let window = DuplicateWindow::default();
        let now = Utc::now();
        let order = Uuid::new_v4();
        let prior = entry(order, "3000", now - Duration::seconds(59), TransactionType::PaymentReceived);
        assert!(window.matches(&prior, order, Decimal::from(3000), now));
    }

    #[test]
    fn outside_window_is_not_a_duplicate() {
        let window = DuplicateWindow::default();
        let now = Utc::now();
        let order = Uuid::new_v4();
        let prior = entry(order, "3000", now - Duration::seconds(61), TransactionType::PaymentReceived);
        assert!(!window.matches(&prior, order, Decimal::from(3000), now));
    }

    #[test]
    fn different_amount_order_or_type_is_not_a_duplicate() {
        let window = DuplicateWindow::default();
        let now = Utc::now();
        let order = Uuid::new_v4();

        let prior = entry(order, "3000", now, TransactionType::PaymentReceived);
        assert!(!window.matches(&prior, order, Decimal::from(2999), now));
        assert!(!window.matches(&prior, Uuid::new_v4(), Decimal::from(3000), now));

        let intake = entry(order, "3000", now, TransactionType::Payment);
        assert!(!window.matches(&intake, order, Decimal::from(3000), now));
    }

    #[test]
    fn bounds_are_symmetric() {
        let now = Utc::now();
        let (from, to) = DuplicateWindow::default().bounds(now);
        assert_eq!(now - from, Duration::seconds(60));
        assert_eq!(to - now, Duration::seconds(60));
    }
}
