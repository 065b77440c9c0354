//! Loyalty points awarded on fully paid collections.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::services::metrics::DB_QUERY_DURATION;

#[async_trait]
pub trait LoyaltyAwarder: Send + Sync {
    /// Award points for `amount` spent, attributed to `order_id`. Returns the
    /// points granted; a repeated award for the same order grants nothing.
    async fn award(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<i64, AppError>;
}

/// Whole points earned for a spend.
pub fn points_for(amount: Decimal, spend_per_point: Decimal) -> i64 {
    if spend_per_point <= Decimal::ZERO || amount <= Decimal::ZERO {
        return 0;
    }
    (amount / spend_per_point).floor().to_i64().unwrap_or(0)
}

/// Writes one `loyalty_points` row per order.
pub struct PointsAwarder {
    pool: PgPool,
    spend_per_point: Decimal,
}

impl PointsAwarder {
    pub fn new(pool: PgPool, spend_per_point: Decimal) -> Self {
        Self {
            pool,
            spend_per_point,
        }
    }
}

#[async_trait]
impl LoyaltyAwarder for PointsAwarder {
    #[instrument(skip(self), fields(customer_id = %customer_id, order_id = %order_id))]
    async fn award(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
    ) -> Result<i64, AppError> {
        let points = points_for(amount, self.spend_per_point);
        if points == 0 {
            return Ok(0);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["award_loyalty"])
            .start_timer();

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO loyalty_points (entry_id, customer_id, order_id, amount, points)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING points
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(order_id)
        .bind(amount)
        .bind(points)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to award points: {}", e)))?;

        timer.observe_duration();

        let granted = inserted.unwrap_or(0);
        info!(points = granted, "Loyalty points awarded");
        Ok(granted)
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
    fn points_are_whole_units_of_spend() {
        assert_eq!(points_for(d("3000"), d("100")), 30);
        assert_eq!(points_for(d("3099.99"), d("100")), 30);
        assert_eq!(points_for(d("99.99"), d("100")), 0);
    }

    #[test]
    fn zero_rate_or_amount_grants_nothing() {
        assert_eq!(points_for(d("3000"), Decimal::ZERO), 0);
        assert_eq!(points_for(Decimal::ZERO, d("100")), 0);
    }
}
