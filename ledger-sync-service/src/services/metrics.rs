//! Prometheus metrics for ledger-sync-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for sync runs by mode and status.
pub static SYNC_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_runs_total",
        "Total number of sync runs",
        &["mode", "status"]
    )
    .expect("Failed to register SYNC_RUNS")
});

/// Counter for rows written to the store by action.
pub static ROWS_WRITTEN: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_rows_written_total",
        "Total number of rows inserted or updated in the store",
        &["action"]
    )
    .expect("Failed to register ROWS_WRITTEN")
});

/// Counter for filter decisions by reason.
pub static FILTER_DECISIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_filter_decisions_total",
        "Total number of filter decisions",
        &["reason"]
    )
    .expect("Failed to register FILTER_DECISIONS")
});

/// Histogram for store query duration by operation.
pub static STORE_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_sync_store_query_duration_seconds",
        "Store query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register STORE_QUERY_DURATION")
});

/// Counter for requests against the transaction source.
pub static SOURCE_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_source_requests_total",
        "Total number of transaction source requests",
        &["status"]
    )
    .expect("Failed to register SOURCE_REQUESTS")
});

/// Counter for anomalies and dropped records.
pub static ANOMALIES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_sync_anomalies_total",
        "Total number of data anomalies seen during sync",
        &["kind"]
    )
    .expect("Failed to register ANOMALIES")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&SYNC_RUNS);
    Lazy::force(&ROWS_WRITTEN);
    Lazy::force(&FILTER_DECISIONS);
    Lazy::force(&STORE_QUERY_DURATION);
    Lazy::force(&SOURCE_REQUESTS);
    Lazy::force(&ANOMALIES);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a finished sync run.
pub fn record_run(mode: &str, status: &str) {
    SYNC_RUNS.with_label_values(&[mode, status]).inc();
}

/// Record rows written by one store call.
pub fn record_rows_written(action: &str, rows: usize) {
    ROWS_WRITTEN
        .with_label_values(&[action])
        .inc_by(rows as f64);
}

/// Record a filter decision.
pub fn record_filter_decision(reason: &str) {
    FILTER_DECISIONS.with_label_values(&[reason]).inc();
}

/// Record a request against the transaction source.
pub fn record_source_request(status: &str) {
    SOURCE_REQUESTS.with_label_values(&[status]).inc();
}

/// Record a reloaded key that was already present in the store.
pub fn record_duplicate_key_anomaly() {
    ANOMALIES.with_label_values(&["duplicate_key"]).inc();
}

/// Record a raw transaction that could not be normalized.
pub fn record_transform_failure() {
    ANOMALIES.with_label_values(&["transform_failure"]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_runs_are_exported() {
        init_metrics();
        record_run("incremental", "success");
        record_rows_written("insert", 3);

        let text = get_metrics().unwrap();

        assert!(text.contains("ledger_sync_runs_total"));
        assert!(text.contains("ledger_sync_rows_written_total"));
    }
}
