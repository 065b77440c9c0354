//! Configuration module for laundry-service.

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LaundryConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub notification_service: NotificationServiceConfig,
    pub business: BusinessConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct NotificationServiceConfig {
    /// Unset disables outbound notifications.
    pub url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BusinessConfig {
    /// Offset of the business time zone from UTC, in minutes.
    pub utc_offset_minutes: i32,
    pub receipt_number_prefix: String,
    pub loyalty_spend_per_point: Decimal,
    /// Raw `DISABLED_BRANCH_FEATURES` value.
    pub disabled_branch_features: String,
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}'", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl LaundryConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "laundry-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            notification_service: NotificationServiceConfig {
                url: env::var("NOTIFICATION_SERVICE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                timeout: Duration::from_millis(parsed_or(
                    "NOTIFICATION_TIMEOUT_MS",
                    5000u64,
                )?),
            },
            business: BusinessConfig {
                utc_offset_minutes: parsed_or("BUSINESS_UTC_OFFSET_MINUTES", 0)?,
                receipt_number_prefix: env::var("RECEIPT_NUMBER_PREFIX")
                    .unwrap_or_else(|_| "RCP".to_string()),
                loyalty_spend_per_point: parsed_or(
                    "LOYALTY_SPEND_PER_POINT",
                    Decimal::ONE_HUNDRED,
                )?,
                disabled_branch_features: env::var("DISABLED_BRANCH_FEATURES")
                    .unwrap_or_default(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn unset_values_fall_back_to_defaults() {
        env::remove_var("BUSINESS_UTC_OFFSET_MINUTES");
        assert_eq!(parsed_or("BUSINESS_UTC_OFFSET_MINUTES", 0i32).unwrap(), 0);
    }

    #[test]
    #[serial]
    fn set_values_are_parsed() {
        env::set_var("LOYALTY_SPEND_PER_POINT", "250");
        let rate = parsed_or("LOYALTY_SPEND_PER_POINT", Decimal::ONE_HUNDRED).unwrap();
        env::remove_var("LOYALTY_SPEND_PER_POINT");
        assert_eq!(rate, Decimal::from(250));
    }

    #[test]
    #[serial]
    fn unparsable_values_are_config_errors() {
        env::set_var("BUSINESS_UTC_OFFSET_MINUTES", "east");
        let result = parsed_or("BUSINESS_UTC_OFFSET_MINUTES", 0i32);
        env::remove_var("BUSINESS_UTC_OFFSET_MINUTES");
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
