//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Convertino server:
//! - HTTP request metrics (latency, counts, in flight)
//! - File and engine status (collected dynamically)
//! - Core conversion metrics re-registered from `convertino_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertino_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "convertino_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// File and Engine Metrics (collected dynamically)
// =============================================================================

/// Files currently tracked by the orchestrator.
pub static FILES_TRACKED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("convertino_files_tracked", "Number of files held in memory").unwrap()
});

/// Files with a conversion in flight.
pub static FILES_PROCESSING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "convertino_files_processing",
        "Number of files currently being converted",
    )
    .unwrap()
});

/// Engines that finished initializing.
pub static ENGINES_READY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("convertino_engines_ready", "Number of ready engines").unwrap()
});

/// Engines that failed to initialize.
pub static ENGINES_FAILED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("convertino_engines_failed", "Number of unavailable engines").unwrap()
});

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let local: Vec<Box<dyn Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(FILES_TRACKED.clone()),
        Box::new(FILES_PROCESSING.clone()),
        Box::new(ENGINES_READY.clone()),
        Box::new(ENGINES_FAILED.clone()),
    ];

    for metric in local
        .into_iter()
        .chain(convertino_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(metric) {
            warn!("Failed to register metric: {}", e);
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the orchestrator right now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().status().await;
    FILES_TRACKED.set(status.files as i64);
    FILES_PROCESSING.set(status.processing as i64);
    ENGINES_READY.set(status.engines_ready as i64);
    ENGINES_FAILED.set(status.engines_failed as i64);
}

/// Normalize a path for metric labels (replace file ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    UUID.replace_all(path, "{id}").into_owned()
}
