/// Metrics and telemetry for roster-sync
///
/// Provides Prometheus-compatible metrics for CI runs:
/// - Identity cache hit/miss rates
/// - Remote call attempts and outcomes per operation
/// - Retry backoff delays
/// - Team apply results
///
/// A run can dump the registry to a textfile for the node exporter collector.

use crate::error::{SyncError, SyncResult};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::path::Path;

lazy_static! {
    // ========== Identity Cache Metrics ==========

    /// Identity cache lookups by result (hit, miss, expired)
    pub static ref IDENTITY_CACHE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roster_identity_cache_lookups_total",
        "Total number of identity cache lookups",
        &["result"]
    )
    .unwrap();

    /// Identity cache size (number of entries)
    pub static ref IDENTITY_CACHE_SIZE: IntGauge = register_int_gauge!(
        "roster_identity_cache_size",
        "Number of entries in the identity cache"
    )
    .unwrap();

    /// Identity resolutions by status
    pub static ref IDENTITY_RESOLUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roster_identity_resolutions_total",
        "Total number of identity resolutions",
        &["status"]
    )
    .unwrap();

    // ========== Remote Call Metrics ==========

    /// Remote call attempts by operation label
    pub static ref REMOTE_CALL_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roster_remote_call_attempts_total",
        "Total number of remote call attempts, retries included",
        &["operation"]
    )
    .unwrap();

    /// Terminal outcome of retried remote calls
    pub static ref REMOTE_CALL_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roster_remote_call_outcomes_total",
        "Terminal outcomes of retried remote calls",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Backoff delay slept between attempts, in seconds
    pub static ref RETRY_DELAY_SECONDS: HistogramVec = register_histogram_vec!(
        "roster_retry_delay_seconds",
        "Backoff delay between retry attempts in seconds",
        &["operation"],
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 30.0, 60.0]
    )
    .unwrap();

    // ========== Apply Metrics ==========

    /// Team applies by status
    pub static ref TEAM_APPLIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "roster_team_applies_total",
        "Total number of team manifests processed",
        &["status"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> SyncResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| SyncError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| SyncError::Internal(format!("Metrics are not valid UTF-8: {}", e)))
}

/// Write the registry to a Prometheus textfile, replacing it atomically
pub fn write_textfile(path: &Path) -> SyncResult<()> {
    let rendered = render_metrics()?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, rendered)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Record an identity cache lookup
pub fn record_cache_lookup(result: &str) {
    IDENTITY_CACHE_LOOKUPS_TOTAL
        .with_label_values(&[result])
        .inc();
}

/// Record the terminal outcome of a retried call
pub fn record_outcome(operation: &str, outcome: &str) {
    REMOTE_CALL_OUTCOMES_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record an identity resolution
pub fn record_identity_resolution(status: &str) {
    IDENTITY_RESOLUTIONS_TOTAL
        .with_label_values(&[status])
        .inc();
}

/// Record a processed team manifest
pub fn record_team_apply(status: &str) {
    TEAM_APPLIES_TOTAL.with_label_values(&[status]).inc();
}
