//! Receipt number generation.
//!
//! Numbers are random and reserved in `receipt_numbers`; a collision is
//! detected on reservation and a fresh number is drawn, at most
//! [`MAX_ATTEMPTS`] times.

use chrono::NaiveDate;
use rand::Rng;

pub const MAX_ATTEMPTS: u32 = 5;

/// No 0/O or 1/I, receipts are read aloud at the counter.
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct ReceiptNumberGenerator {
    prefix: String,
}

impl ReceiptNumberGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `{prefix}-{YYYYMMDD}-{suffix}`.
    pub fn generate(&self, business_day: NaiveDate) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!(
            "{}-{}-{}",
            self.prefix,
            business_day.format("%Y%m%d"),
            suffix
        )
    }
}

impl Default for ReceiptNumberGenerator {
    fn default() -> Self {
        Self::new("RCP")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn number_carries_prefix_and_day() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let number = ReceiptNumberGenerator::new("WEST").generate(day);
        assert!(number.starts_with("WEST-20261017-"));
        assert_eq!(number.len(), "WEST-20261017-".len() + SUFFIX_LEN);
        assert!(number
            .rsplit('-')
            .next()
            .unwrap()
            .bytes()
            .all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn numbers_rarely_repeat() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let generator = ReceiptNumberGenerator::default();
        let numbers: HashSet<String> = (0..500).map(|_| generator.generate(day)).collect();
        assert!(numbers.len() >= 499);
    }
}
