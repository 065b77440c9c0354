//! Receipt aggregate: every line sharing one receipt number.
//!
//! Collection and payment are decided here against the whole receipt and
//! returned as a [`PaymentPlan`]; the database layer applies a plan verbatim
//! inside the transaction that holds the receipt's row locks. Partial-item
//! collection cannot be expressed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use super::money::{approx_eq, round2, sum2, RECEIPT_TOLERANCE, TOLERANCE};
use super::validator::{status_for, validate_payment};
use crate::models::{
    AuditAction, CreateReceipt, NewAuditEntry, OrderLine, PaymentMethod, PaymentStatus,
};

/// Money offered by the caller in one action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProposedPayment {
    pub amount: Decimal,
    pub method: PaymentMethod,
}

/// New payment fields of one line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineUpdate {
    pub order_id: Uuid,
    pub old_paid_amount: Decimal,
    pub old_payment_status: PaymentStatus,
    pub old_payment_method: PaymentMethod,
    pub new_paid_amount: Decimal,
    pub new_payment_status: PaymentStatus,
    pub new_payment_method: PaymentMethod,
}

/// Everything one collect / receive-payment event writes.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentPlan {
    pub receipt_number: String,
    pub action: AuditAction,
    /// Set every line to `collected`.
    pub collect: bool,
    pub line_updates: Vec<LineUpdate>,
    /// Amount of the single `payment_received` ledger entry, if money moved.
    pub ledger_amount: Option<Decimal>,
    pub payment_method: PaymentMethod,
    pub resulting_status: PaymentStatus,
    pub receipt_total: Decimal,
    /// Line the ledger entry and the loyalty award are attributed to.
    pub anchor_order_id: Uuid,
    pub customer_id: Uuid,
}

impl PaymentPlan {
    /// Loyalty is awarded once, on a collection that leaves the receipt fully paid.
    pub fn awards_loyalty(&self) -> bool {
        self.collect && self.resulting_status == PaymentStatus::PaidFull
    }

    /// One audit entry per line, all pointing at the same ledger event.
    pub fn audit_entries(&self, transaction_id: Option<Uuid>) -> Vec<NewAuditEntry> {
        let event = match (self.ledger_amount, transaction_id) {
            (Some(amount), Some(id)) => format!(
                "; payment {} via {} (transaction {})",
                amount, self.payment_method, id
            ),
            _ => String::new(),
        };
        let verb = if self.collect { "collected" } else { "settled" };
        let notes = format!("Receipt {} {}{}", self.receipt_number, verb, event);

        self.line_updates
            .iter()
            .map(|u| NewAuditEntry {
                order_id: u.order_id,
                action: self.action,
                old_payment_status: Some(u.old_payment_status),
                new_payment_status: Some(u.new_payment_status),
                old_paid_amount: Some(u.old_paid_amount),
                new_paid_amount: Some(u.new_paid_amount),
                old_payment_method: Some(u.old_payment_method),
                new_payment_method: Some(u.new_payment_method),
                notes: Some(notes.clone()),
            })
            .collect()
    }
}

/// Read view of a receipt with its aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub receipt_number: String,
    pub branch_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub receipt_total: Decimal,
    pub receipt_paid: Decimal,
    pub balance_due: Decimal,
    pub payment_status: PaymentStatus,
    pub collected: bool,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone)]
pub struct Receipt {
    receipt_number: String,
    lines: Vec<OrderLine>,
}

impl Receipt {
    /// Build the aggregate from every line of one receipt.
    pub fn new(lines: Vec<OrderLine>) -> Result<Self, AppError> {
        let first = lines
            .first()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Receipt has no lines")))?;
        let receipt_number = first.receipt_number.clone();

        if let Some(stray) = lines.iter().find(|l| l.receipt_number != receipt_number) {
            return Err(AppError::InternalError(anyhow::anyhow!(
                "Line {} belongs to receipt {}, not {}",
                stray.order_id,
                stray.receipt_number,
                receipt_number
            )));
        }

        // Creation stamps every line with one branch. Legacy lines are adopted
        // one at a time, so a partly adopted receipt can still land here.
        if let Some(stray) = lines.iter().find(|l| l.branch_id != first.branch_id) {
            return Err(AppError::InternalError(anyhow::anyhow!(
                "Receipt {} spans branches {:?} and {:?} (line {})",
                receipt_number,
                first.branch_id,
                stray.branch_id,
                stray.order_id
            )));
        }

        Ok(Self {
            receipt_number,
            lines,
        })
    }

    pub fn receipt_number(&self) -> &str {
        &self.receipt_number
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn branch_id(&self) -> Option<Uuid> {
        self.first().branch_id
    }

    fn first(&self) -> &OrderLine {
        &self.lines[0]
    }

    pub fn total(&self) -> Decimal {
        sum2(self.lines.iter().map(|l| l.total_amount))
    }

    pub fn paid(&self) -> Decimal {
        sum2(self.lines.iter().map(|l| l.paid_amount))
    }

    pub fn balance_due(&self) -> Decimal {
        round2(self.total() - self.paid())
    }

    pub fn is_fully_paid(&self) -> bool {
        self.balance_due() <= TOLERANCE
    }

    pub fn summary(&self) -> ReceiptSummary {
        let first = self.first();
        ReceiptSummary {
            receipt_number: self.receipt_number.clone(),
            branch_id: first.branch_id,
            customer_id: first.customer_id,
            receipt_total: self.total(),
            receipt_paid: self.paid(),
            balance_due: self.balance_due(),
            payment_status: status_for(self.total(), self.paid()),
            collected: self.lines.iter().all(|l| l.is_collected()),
            lines: self.lines.clone(),
        }
    }

    /// Plan collection of every line, optionally taking a payment first.
    pub fn plan_collect(&self, payment: Option<ProposedPayment>) -> Result<PaymentPlan, AppError> {
        if let Some(line) = self.lines.iter().find(|l| l.is_collected()) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Receipt {} is already collected (line {})",
                self.receipt_number,
                line.order_id
            )));
        }

        let total = self.total();
        let paid = self.paid();
        let balance = self.balance_due();

        let (new_paid, method, credited) = match payment {
            None => {
                if balance > TOLERANCE {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Receipt {} has an outstanding balance of {}; settle payment before collecting",
                        self.receipt_number,
                        balance
                    )));
                }
                (paid, self.first().payment_method, None)
            }
            Some(p) => {
                self.check_payment_amount(p.amount, balance)?;
                if p.amount > balance + TOLERANCE {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "Payment {} exceeds balance due {} on receipt {}",
                        p.amount,
                        balance,
                        self.receipt_number
                    )));
                }
                let credited = round2(p.amount.min(balance));
                (round2(paid + credited), p.method, Some(credited))
            }
        };

        let resulting_status = if new_paid >= total - TOLERANCE {
            PaymentStatus::PaidFull
        } else {
            PaymentStatus::Advance
        };

        let new_amounts = match (resulting_status, credited) {
            (PaymentStatus::PaidFull, _) => self.lines.iter().map(|l| l.total_amount).collect(),
            (_, Some(credited)) => self.spread_over_balances(credited),
            (_, None) => self.lines.iter().map(|l| l.paid_amount).collect(),
        };

        Ok(self.build_plan(
            AuditAction::Collected,
            true,
            new_amounts,
            resulting_status,
            method,
            credited,
        ))
    }

    /// Plan a full settlement without collecting.
    ///
    /// Only an amount equal to the balance (within two cents) is accepted;
    /// every line is then set to its own total.
    pub fn plan_receive_payment(&self, payment: ProposedPayment) -> Result<PaymentPlan, AppError> {
        let balance = self.balance_due();
        self.check_payment_amount(payment.amount, balance)?;

        if !approx_eq(payment.amount, balance, RECEIPT_TOLERANCE) {
            if payment.amount > balance {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Payment {} exceeds balance due {} on receipt {}",
                    payment.amount,
                    balance,
                    self.receipt_number
                )));
            }
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only full settlement of {} is accepted for receipt {} (got {})",
                balance,
                self.receipt_number,
                payment.amount
            )));
        }

        let new_amounts = self.lines.iter().map(|l| l.total_amount).collect();
        Ok(self.build_plan(
            AuditAction::PaymentReceived,
            false,
            new_amounts,
            PaymentStatus::PaidFull,
            payment.method,
            Some(balance),
        ))
    }

    fn check_payment_amount(&self, amount: Decimal, balance: Decimal) -> Result<(), AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be greater than zero (got {})",
                amount
            )));
        }
        if balance <= TOLERANCE {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Receipt {} is already fully paid",
                self.receipt_number
            )));
        }
        Ok(())
    }

    /// Spread `amount` over the lines in proportion to each line's open
    /// balance. Line paid amounts only grow, never pass their totals, and the
    /// increments sum to `amount` exactly.
    fn spread_over_balances(&self, amount: Decimal) -> Vec<Decimal> {
        let balances: Vec<Decimal> = self
            .lines
            .iter()
            .map(|l| round2(l.total_amount - l.paid_amount).max(Decimal::ZERO))
            .collect();
        let open = sum2(balances.iter().copied());

        let mut increments: Vec<Decimal> = if open.is_zero() {
            vec![Decimal::ZERO; balances.len()]
        } else {
            balances
                .iter()
                .map(|b| round2(amount * *b / open).min(*b))
                .collect()
        };

        // Rounding remainder goes to lines that still have room, in order.
        let mut leftover = round2(amount - sum2(increments.iter().copied()));
        for (inc, room) in increments.iter_mut().zip(&balances) {
            if leftover.is_zero() {
                break;
            }
            let available = round2(*room - *inc);
            let take = if leftover > Decimal::ZERO {
                leftover.min(available)
            } else {
                leftover.max(-*inc)
            };
            *inc = round2(*inc + take);
            leftover = round2(leftover - take);
        }

        self.lines
            .iter()
            .zip(increments)
            .map(|(l, inc)| round2(l.paid_amount + inc))
            .collect()
    }

    fn build_plan(
        &self,
        action: AuditAction,
        collect: bool,
        new_amounts: Vec<Decimal>,
        resulting_status: PaymentStatus,
        method: PaymentMethod,
        ledger_amount: Option<Decimal>,
    ) -> PaymentPlan {
        let first = self.first();
        let line_updates = self
            .lines
            .iter()
            .zip(new_amounts)
            .map(|(l, new_paid)| LineUpdate {
                order_id: l.order_id,
                old_paid_amount: l.paid_amount,
                old_payment_status: l.payment_status,
                old_payment_method: l.payment_method,
                new_paid_amount: new_paid,
                new_payment_status: resulting_status,
                new_payment_method: method,
            })
            .collect();

        PaymentPlan {
            receipt_number: self.receipt_number.clone(),
            action,
            collect,
            line_updates,
            ledger_amount,
            payment_method: method,
            resulting_status,
            receipt_total: self.total(),
            anchor_order_id: first.order_id,
            customer_id: first.customer_id,
        }
    }
}

/// Check every line of a new receipt and return the amount paid up front.
pub fn validate_new_receipt(request: &CreateReceipt) -> Result<Decimal, AppError> {
    for (i, line) in request.lines.iter().enumerate() {
        validate_payment(line.total_amount, line.paid_amount, line.payment_status).map_err(|v| {
            AppError::BadRequest(anyhow::anyhow!("Line {}: {} [{}]", i + 1, v, v.rule()))
        })?;
    }
    Ok(sum2(request.lines.iter().map(|l| round2(l.paid_amount))))
}
