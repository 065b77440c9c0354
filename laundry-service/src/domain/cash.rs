//! Daily cash position for one branch-day.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use super::money::round2;
use crate::models::ManualAdjustments;

/// Source figures for one (branch, date), each already summed and rounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CashInputs {
    /// Closing balance of the saved previous day, zero if none.
    pub opening_balance: Decimal,
    /// Cash taken in full at order intake.
    pub cash_sales: Decimal,
    /// Cash taken later through collect / receive-payment.
    pub book_sales: Decimal,
    pub card_sales: Decimal,
    pub mobile_money_sales: Decimal,
    pub bank_deposits: Decimal,
    pub expenses_from_cash: Decimal,
    pub expenses_from_bank: Decimal,
    pub expenses_from_mpesa: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CashPosition {
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
}

impl CashPosition {
    /// `cash_in_hand = opening + cash_sales + book_sales - expenses_from_cash - bank_deposits`,
    /// and the day closes on that figure.
    pub fn compute(inputs: CashInputs) -> Self {
        let cash_in_hand = round2(
            inputs.opening_balance + inputs.cash_sales + inputs.book_sales
                - inputs.expenses_from_cash
                - inputs.bank_deposits,
        );

        Self {
            opening_balance: round2(inputs.opening_balance),
            cash_sales: round2(inputs.cash_sales),
            book_sales: round2(inputs.book_sales),
            card_sales: round2(inputs.card_sales),
            mobile_money_sales: round2(inputs.mobile_money_sales),
            bank_deposits: round2(inputs.bank_deposits),
            expenses_from_cash: round2(inputs.expenses_from_cash),
            expenses_from_bank: round2(inputs.expenses_from_bank),
            expenses_from_mpesa: round2(inputs.expenses_from_mpesa),
            cash_in_hand,
            closing_balance: cash_in_hand,
        }
    }

    /// Apply caller-reported card / mobile money figures. Neither enters the
    /// cash formula, so the closing balance is unchanged.
    pub fn with_adjustments(mut self, adjustments: &ManualAdjustments) -> Result<Self, AppError> {
        if let Some(card) = adjustments.card_sales {
            self.card_sales = non_negative("card_sales", card)?;
        }
        if let Some(mobile) = adjustments.mobile_money_sales {
            self.mobile_money_sales = non_negative("mobile_money_sales", mobile)?;
        }
        Ok(self)
    }
}

fn non_negative(field: &str, value: Decimal) -> Result<Decimal, AppError> {
    if value < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "{} must not be negative (got {})",
            field,
            value
        )));
    }
    Ok(round2(value))
}

/// Maps timestamps to business days in a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct BusinessCalendar {
    offset: FixedOffset,
}

impl BusinessCalendar {
    pub fn new(utc_offset_minutes: i32) -> Result<Self, AppError> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "Invalid business UTC offset: {} minutes",
                utc_offset_minutes
            ))
        })?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Business day a UTC instant falls on.
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Half-open UTC range `[start, end)` covering one business day.
    pub fn day_range(&self, day: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), AppError> {
        let midnight = day.and_hms_opt(0, 0, 0).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Invalid business day {}", day))
        })?;
        let start = self
            .offset
            .from_local_datetime(&midnight)
            .single()
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid business day {}", day)))?
            .with_timezone(&Utc);
        Ok((start, start + Duration::days(1)))
    }
}
