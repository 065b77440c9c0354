//! Ledger versus line-paid comparison.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::{approx_eq, round2, sum2, TOLERANCE};
use crate::models::{OrderLine, Transaction, TransactionType};

/// A receipt whose ledger and line figures disagree by more than a cent.
/// Reported, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityWarning {
    pub receipt_number: String,
    pub order_ids: Vec<Uuid>,
    pub ledger_total: Decimal,
    pub lines_paid: Decimal,
    /// `ledger_total - lines_paid`.
    pub difference: Decimal,
}

/// Money received for a receipt according to the ledger.
pub fn ledger_received(entries: &[Transaction]) -> Decimal {
    sum2(
        entries
            .iter()
            .filter(|e| {
                matches!(
                    e.parsed_type(),
                    Some(TransactionType::Payment | TransactionType::PaymentReceived)
                )
            })
            .map(|e| e.amount),
    )
}

/// Compare the ledger entries of a receipt's lines against their paid amounts.
pub fn check_receipt(
    receipt_number: &str,
    lines: &[OrderLine],
    entries: &[Transaction],
) -> Option<IntegrityWarning> {
    let ledger_total = ledger_received(entries);
    let lines_paid = sum2(lines.iter().map(|l| l.paid_amount));

    if approx_eq(ledger_total, lines_paid, TOLERANCE) {
        return None;
    }

    Some(IntegrityWarning {
        receipt_number: receipt_number.to_string(),
        order_ids: lines.iter().map(|l| l.order_id).collect(),
        ledger_total,
        lines_paid,
        difference: round2(ledger_total - lines_paid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderStatus, PaymentMethod, PaymentStatus};
    use chrono::Utc;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(paid: &str) -> OrderLine {
        OrderLine {
            order_id: Uuid::new_v4(),
            receipt_number: "RCP-1".to_string(),
            customer_id: Uuid::nil(),
            branch_id: None,
            description: "Suit".to_string(),
            total_amount: d("5000"),
            paid_amount: d(paid),
            payment_status: PaymentStatus::Advance,
            payment_method: PaymentMethod::Cash,
            status: OrderStatus::Pending,
            order_date: Utc::now(),
            ready_date: None,
            collected_date: None,
            created_by: "clerk".to_string(),
        }
    }

    fn entry(kind: &str, amount: &str) -> Transaction {
        Transaction {
            transaction_id: Uuid::new_v4(),
            order_id: None,
            transaction_type: kind.to_string(),
            amount: d(amount),
            payment_method: "cash".to_string(),
            branch_id: None,
            created_by: "clerk".to_string(),
            transaction_date: Utc::now(),
            notes: None,
        }
    }

    #[test]
    fn matching_figures_produce_no_warning() {
        let lines = [line("1000"), line("500")];
        let entries = [entry("payment", "1000"), entry("payment_received", "500.01")];
        assert_eq!(check_receipt("RCP-1", &lines, &entries), None);
    }

    #[test]
    fn mismatch_beyond_a_cent_is_reported() {
        let lines = [line("1000"), line("500")];
        let entries = [entry("payment", "1000")];
        let warning = check_receipt("RCP-1", &lines, &entries).unwrap();
        assert_eq!(warning.ledger_total, d("1000"));
        assert_eq!(warning.lines_paid, d("1500"));
        assert_eq!(warning.difference, d("-500"));
        assert_eq!(warning.order_ids.len(), 2);
    }

    #[test]
    fn expense_entries_are_not_money_received() {
        let entries = [entry("payment_received", "200"), entry("expense", "50")];
        assert_eq!(ledger_received(&entries), d("200"));
    }
}
