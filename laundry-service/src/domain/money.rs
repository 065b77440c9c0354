//! Money rounding and tolerance helpers.
//!
//! Every aggregation step rounds to cents; every comparison goes through a
//! fixed tolerance so that values read back from NUMERIC columns or summed
//! across lines never flip a decision on a sub-cent difference.

use rust_decimal::{Decimal, RoundingStrategy};

/// General comparison tolerance (one cent).
pub const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Tolerance for matching a receipt-level payment against its balance.
pub const RECEIPT_TOLERANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Round to two decimals, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sum and round.
pub fn sum2<I>(values: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    round2(values.into_iter().fold(Decimal::ZERO, |acc, v| round2(acc + v)))
}

/// `|a - b| <= tolerance`.
pub fn approx_eq(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= tolerance
}
