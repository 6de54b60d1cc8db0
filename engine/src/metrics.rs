//! Prometheus metrics for the inspection engine

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

// ── Request metrics ──────────────────────────────────────────────────────────

pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inspection_requests_total",
        "Inspection requests served",
        &["status"]
    )
    .unwrap()
});

// ── Evaluator metrics ────────────────────────────────────────────────────────

pub static FINDINGS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inspection_findings_total",
        "Findings produced by each rule category",
        &["rule"]
    )
    .unwrap()
});

pub static EVALUATOR_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "inspection_evaluator_duration_seconds",
        "Time spent in each rule category, snapshot fetches included",
        &["rule"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .unwrap()
});

pub static SKIPPED_ROWS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "inspection_skipped_rows_total",
        "Snapshot rows skipped because a value was malformed",
        &["rule"]
    )
    .unwrap()
});

/// Record `count` malformed rows skipped by `rule`.
pub fn record_skipped(rule: &str, count: usize) {
    if count > 0 {
        SKIPPED_ROWS.with_label_values(&[rule]).inc_by(count as f64);
        tracing::debug!(rule, count, "skipped malformed snapshot rows");
    }
}

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
