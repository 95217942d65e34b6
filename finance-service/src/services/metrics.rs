//! Prometheus metrics for finance-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec,
};

/// Ledger rows created by the derivation pipeline, by ledger and source
/// (api, sync).
pub static LEDGER_ROWS_CREATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_ledger_rows_created_total",
        "Commission and operator payment rows created",
        &["ledger", "source"]
    )
    .expect("Failed to register ledger_rows_created")
});

/// Closing actions by type and action (close, undo).
pub static CLOSING_ACTIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_closing_actions_total",
        "Closing batches created or undone",
        &["closing_type", "action"]
    )
    .expect("Failed to register closing_actions_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "finance_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "finance_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Report generation duration histogram by report kind.
pub static REPORT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "finance_report_duration_seconds",
        "Financial report generation duration in seconds",
        &["report"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register report_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&LEDGER_ROWS_CREATED);
    Lazy::force(&CLOSING_ACTIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&REPORT_DURATION);
}
