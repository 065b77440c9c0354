//! Outbound notifications: daily closing report, ready and collection notices.
//!
//! Every call is best-effort. Callers log and count failures; a failure never
//! undoes the write that triggered it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::domain::ReceiptSummary;
use crate::models::{DailyCashSummary, OrderLine};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifier not enabled: {0}")]
    NotEnabled(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_daily_closing_report(
        &self,
        summary: &DailyCashSummary,
    ) -> Result<(), NotifyError>;
    async fn send_ready_notification(&self, line: &OrderLine) -> Result<(), NotifyError>;
    async fn send_collection_notification(
        &self,
        receipt: &ReceiptSummary,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NotificationRequest<'a> {
    DailyClosingReport { summary: &'a DailyCashSummary },
    OrderReady { line: &'a OrderLine },
    ReceiptCollected { receipt: &'a ReceiptSummary },
}

/// Posts JSON to the notification service.
pub struct HttpNotifier {
    base_url: String,
    client: Client,
}

impl HttpNotifier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Connection(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post(&self, request: &NotificationRequest<'_>) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(format!("{}/notifications", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                NotifyError::Connection(format!("Failed to reach notification service: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::SendFailed(format!(
                "Notification service returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_daily_closing_report(
        &self,
        summary: &DailyCashSummary,
    ) -> Result<(), NotifyError> {
        self.post(&NotificationRequest::DailyClosingReport { summary })
            .await?;
        tracing::info!(
            branch_id = %summary.branch_id,
            summary_date = %summary.summary_date,
            "Daily closing report sent"
        );
        Ok(())
    }

    async fn send_ready_notification(&self, line: &OrderLine) -> Result<(), NotifyError> {
        self.post(&NotificationRequest::OrderReady { line }).await
    }

    async fn send_collection_notification(
        &self,
        receipt: &ReceiptSummary,
    ) -> Result<(), NotifyError> {
        self.post(&NotificationRequest::ReceiptCollected { receipt })
            .await
    }
}

/// Used when no notification service is configured. Every send reports
/// `NotEnabled`, so closing reports come back with `report_sent = false`.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_daily_closing_report(
        &self,
        _summary: &DailyCashSummary,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::NotEnabled("no notification service configured".to_string()))
    }

    async fn send_ready_notification(&self, _line: &OrderLine) -> Result<(), NotifyError> {
        Err(NotifyError::NotEnabled("no notification service configured".to_string()))
    }

    async fn send_collection_notification(
        &self,
        _receipt: &ReceiptSummary,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::NotEnabled("no notification service configured".to_string()))
    }
}

/// Mock notifier for testing.
pub struct MockNotifier {
    fail: bool,
    send_count: AtomicU64,
}

impl MockNotifier {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    fn record(&self, what: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::SendFailed(format!("[MOCK] {} failed", what)));
        }
        self.send_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!(notification = what, "[MOCK] Notification would be sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_daily_closing_report(
        &self,
        _summary: &DailyCashSummary,
    ) -> Result<(), NotifyError> {
        self.record("daily_closing_report")
    }

    async fn send_ready_notification(&self, _line: &OrderLine) -> Result<(), NotifyError> {
        self.record("order_ready")
    }

    async fn send_collection_notification(
        &self,
        _receipt: &ReceiptSummary,
    ) -> Result<(), NotifyError> {
        self.record("receipt_collected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn summary() -> DailyCashSummary {
        DailyCashSummary {
            summary_date: Utc::now().date_naive(),
            branch_id: Uuid::new_v4(),
            opening_balance: Decimal::ZERO,
            cash_sales: Decimal::ZERO,
            book_sales: Decimal::ZERO,
            card_sales: Decimal::ZERO,
            mobile_money_sales: Decimal::ZERO,
            bank_deposits: Decimal::ZERO,
            expenses_from_cash: Decimal::ZERO,
            expenses_from_bank: Decimal::ZERO,
            expenses_from_mpesa: Decimal::ZERO,
            cash_in_hand: Decimal::ZERO,
            closing_balance: Decimal::ZERO,
            notes: None,
            is_reconciled: true,
            reconciled_by: Some("manager".to_string()),
            reconciled_utc: Some(Utc::now()),
            saved_by: "manager".to_string(),
            updated_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mock_counts_successful_sends() {
        let notifier = MockNotifier::new(false);
        notifier.send_daily_closing_report(&summary()).await.unwrap();
        assert_eq!(notifier.send_count(), 1);
    }

    #[tokio::test]
    async fn failing_mock_reports_error() {
        let notifier = MockNotifier::new(true);
        assert!(notifier.send_daily_closing_report(&summary()).await.is_err());
        assert_eq!(notifier.send_count(), 0);
    }

    #[tokio::test]
    async fn noop_is_never_enabled() {
        assert!(matches!(
            NoopNotifier.send_daily_closing_report(&summary()).await,
            Err(NotifyError::NotEnabled(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_connection_error() {
        let notifier = HttpNotifier::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(matches!(
            notifier.send_daily_closing_report(&summary()).await,
            Err(NotifyError::Connection(_))
        ));
    }

    #[test]
    fn request_is_tagged_by_kind() {
        let s = summary();
        let json = serde_json::to_value(NotificationRequest::DailyClosingReport { summary: &s })
            .unwrap();
        assert_eq!(json["kind"], "daily_closing_report");
        assert!(json["summary"]["branch_id"].is_string());
    }
}
