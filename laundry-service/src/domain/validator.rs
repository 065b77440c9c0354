//! Payment shape validation for order intake.
//!
//! Collection and receive-payment apply the stricter receipt-level rules in
//! [`crate::domain::receipt`] instead.

use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

use super::money::TOLERANCE;
use crate::models::PaymentStatus;

/// A broken payment rule. Each variant names exactly one rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentRuleViolation {
    #[error("paid_amount must not be negative (got {paid})")]
    NegativePaidAmount { paid: Decimal },

    #[error("total_amount must not be negative (got {total})")]
    NegativeTotalAmount { total: Decimal },

    #[error("paid_full requires paid_amount to equal total_amount {total} (got {paid})")]
    PaidFullMismatch { total: Decimal, paid: Decimal },

    #[error("advance requires 0 < paid_amount < total_amount {total} (got {paid})")]
    AdvanceOutOfRange { total: Decimal, paid: Decimal },

    #[error("not_paid requires paid_amount to be 0 (got {paid})")]
    NotPaidWithPayment { paid: Decimal },
}

impl PaymentRuleViolation {
    /// Stable identifier of the violated rule.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::NegativePaidAmount { .. } => "paid_amount_non_negative",
            Self::NegativeTotalAmount { .. } => "total_amount_non_negative",
            Self::PaidFullMismatch { .. } => "paid_full_matches_total",
            Self::AdvanceOutOfRange { .. } => "advance_strictly_between",
            Self::NotPaidWithPayment { .. } => "not_paid_is_zero",
        }
    }
}

impl From<PaymentRuleViolation> for AppError {
    fn from(v: PaymentRuleViolation) -> Self {
        AppError::BadRequest(anyhow::anyhow!("{} [{}]", v, v.rule()))
    }
}

/// Check a proposed (total, paid, status) shape. Payment methods are
/// checked when they are parsed into [`crate::models::PaymentMethod`].
pub fn validate_payment(
    total_amount: Decimal,
    paid_amount: Decimal,
    status: PaymentStatus,
) -> Result<(), PaymentRuleViolation> {
    if total_amount < Decimal::ZERO {
        return Err(PaymentRuleViolation::NegativeTotalAmount {
            total: total_amount,
        });
    }
    if paid_amount < Decimal::ZERO {
        return Err(PaymentRuleViolation::NegativePaidAmount { paid: paid_amount });
    }

    match status {
        PaymentStatus::PaidFull => {
            if (paid_amount - total_amount).abs() > TOLERANCE {
                return Err(PaymentRuleViolation::PaidFullMismatch {
                    total: total_amount,
                    paid: paid_amount,
                });
            }
        }
        PaymentStatus::Advance => {
            if paid_amount <= Decimal::ZERO || paid_amount >= total_amount {
                return Err(PaymentRuleViolation::AdvanceOutOfRange {
                    total: total_amount,
                    paid: paid_amount,
                });
            }
        }
        PaymentStatus::NotPaid => {
            if paid_amount != Decimal::ZERO {
                return Err(PaymentRuleViolation::NotPaidWithPayment { paid: paid_amount });
            }
        }
    }

    Ok(())
}

/// Status implied by a paid/total relation.
pub fn status_for(total_amount: Decimal, paid_amount: Decimal) -> PaymentStatus {
    if paid_amount <= Decimal::ZERO {
        PaymentStatus::NotPaid
    } else if paid_amount >= total_amount - TOLERANCE {
        PaymentStatus::PaidFull
    } else {
        PaymentStatus::Advance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn valid_shapes_pass() {
        let cases = [
            ("1000", "0", PaymentStatus::NotPaid),
            ("1000", "1000", PaymentStatus::PaidFull),
            ("1000", "999.99", PaymentStatus::PaidFull),
            ("1000", "1000.01", PaymentStatus::PaidFull),
            ("1000", "0.01", PaymentStatus::Advance),
            ("1000", "999.99", PaymentStatus::Advance),
            ("0", "0", PaymentStatus::PaidFull),
            ("0", "0", PaymentStatus::NotPaid),
        ];
        for (total, paid, status) in cases {
            assert_eq!(
                validate_payment(d(total), d(paid), status),
                Ok(()),
                "{} / {} / {}",
                total,
                paid,
                status
            );
        }
    }

    #[test]
    fn negative_paid_is_rejected() {
        let err = validate_payment(d("100"), d("-1"), PaymentStatus::NotPaid).unwrap_err();
        assert_eq!(err.rule(), "paid_amount_non_negative");
    }

    #[test]
    fn paid_full_must_match_total() {
        let err =
            validate_payment(d("1000"), d("999.98"), PaymentStatus::PaidFull).unwrap_err();
        assert_eq!(err.rule(), "paid_full_matches_total");
        assert!(err.to_string().contains("paid_full"));
    }

    #[test]
    fn advance_must_be_strictly_between() {
        for paid in ["0", "1000", "1200"] {
            let err =
                validate_payment(d("1000"), d(paid), PaymentStatus::Advance).unwrap_err();
            assert_eq!(err.rule(), "advance_strictly_between");
        }
    }

    #[test]
    fn not_paid_must_be_zero() {
        let err = validate_payment(d("1000"), d("10"), PaymentStatus::NotPaid).unwrap_err();
        assert_eq!(err.rule(), "not_paid_is_zero");
    }

    #[test]
    fn violation_converts_to_bad_request_with_rule_id() {
        let err: AppError = PaymentRuleViolation::NotPaidWithPayment { paid: d("5") }.into();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(err.to_string().contains("not_paid_is_zero"));
    }

    #[test]
    fn status_follows_paid_total_relation() {
        assert_eq!(status_for(d("100"), d("0")), PaymentStatus::NotPaid);
        assert_eq!(status_for(d("100"), d("40")), PaymentStatus::Advance);
        assert_eq!(status_for(d("100"), d("99.99")), PaymentStatus::PaidFull);
        assert_eq!(status_for(d("100"), d("100")), PaymentStatus::PaidFull);
    }
}
