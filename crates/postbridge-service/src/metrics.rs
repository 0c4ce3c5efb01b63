//! Prometheus metrics for the data layer and the migration tooling.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // ========== Data Layer ==========

    /// Posts written, by backend and outcome (success/error)
    pub static ref POSTS_CREATED_TOTAL: CounterVec = register_counter_vec!(
        "postbridge_posts_created_total",
        "Post writes by backend and outcome",
        &["backend", "outcome"]
    )
    .unwrap();

    /// Secondary writes that failed while the primary succeeded
    pub static ref DUAL_WRITE_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "postbridge_dual_write_failures_total",
        "Secondary (dual-write) failures by backend",
        &["backend"]
    )
    .unwrap();

    /// Read latency by backend and operation (seconds)
    pub static ref READ_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "postbridge_read_duration_seconds",
        "Read latency by backend in seconds",
        &["backend", "operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Migration ==========

    /// Documents processed by the bulk migrator, by collection and outcome
    /// (written/dry_run/error)
    pub static ref MIGRATION_DOCUMENTS_TOTAL: CounterVec = register_counter_vec!(
        "postbridge_migration_documents_total",
        "Documents processed by the bulk migrator",
        &["collection", "outcome"]
    )
    .unwrap();

    /// Batch write latency (seconds)
    pub static ref MIGRATION_BATCH_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "postbridge_migration_batch_duration_seconds",
        "Cassandra batch write latency in seconds",
        &["collection"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// Verification findings by collection and kind
    pub static ref VERIFICATION_MISMATCHES_TOTAL: CounterVec = register_counter_vec!(
        "postbridge_verification_mismatches_total",
        "Verification mismatches by collection and kind",
        &["collection", "kind"]
    )
    .unwrap();
}

/// Exports all metrics in Prometheus text format
///
/// ```rust
/// use postbridge_service::metrics;
///
/// let metrics_text = metrics::export_prometheus();
/// println!("{}", metrics_text);
/// ```
pub fn export_prometheus() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
        });

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to UTF-8: {}", e);
        String::from("# Error encoding metrics\n")
    })
}
