//! Prometheus metrics for laundry-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Payment events by action (create / collect / receive_payment) and outcome.
pub static PAYMENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "laundry_payments_total",
        "Total number of payment events",
        &["action", "status"]
    )
    .expect("Failed to register PAYMENTS")
});

pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "laundry_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

pub static DUPLICATE_PAYMENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "laundry_duplicate_payments_total",
        "Payments rejected by the duplicate window",
        &["action"]
    )
    .expect("Failed to register DUPLICATE_PAYMENTS")
});

/// Cash day operations (save / reconcile) by outcome.
pub static RECONCILIATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "laundry_reconciliations_total",
        "Total number of daily cash save and reconcile operations",
        &["operation", "status"]
    )
    .expect("Failed to register RECONCILIATIONS")
});

/// Best-effort side effects (notifications, loyalty) that failed after commit.
pub static SIDE_EFFECT_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "laundry_side_effect_failures_total",
        "Post-commit side effects that failed",
        &["effect"]
    )
    .expect("Failed to register SIDE_EFFECT_FAILURES")
});

pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "laundry_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&PAYMENTS);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&DUPLICATE_PAYMENTS);
    Lazy::force(&RECONCILIATIONS);
    Lazy::force(&SIDE_EFFECT_FAILURES);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_payment(action: &str, status: &str) {
    PAYMENTS.with_label_values(&[action, status]).inc();
}

pub fn record_duplicate_payment(action: &str) {
    DUPLICATE_PAYMENTS.with_label_values(&[action]).inc();
}

pub fn record_reconciliation(operation: &str, status: &str) {
    RECONCILIATIONS.with_label_values(&[operation, status]).inc();
}

pub fn record_side_effect_failure(effect: &str) {
    SIDE_EFFECT_FAILURES.with_label_values(&[effect]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
