//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Conversions (outcomes and duration per engine)
//! - Execution channels (worker timeouts)
//! - Engine lifecycle (initialization failures)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversions total by engine and result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_conversions_total", "Total conversions attempted"),
        &["engine", "result"], // "success", "failed", "cancelled"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertino_conversion_duration_seconds",
            "Duration of conversions",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 1800.0]),
        &["engine"],
    )
    .unwrap()
});

// =============================================================================
// Channel and Engine Metrics
// =============================================================================

/// Worker requests that hit the channel timeout.
pub static WORKER_TIMEOUTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertino_worker_timeouts_total",
            "Worker requests that timed out",
        ),
        &["engine"],
    )
    .unwrap()
});

/// Engine initialization failures.
pub static ENGINE_INIT_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertino_engine_init_failures_total",
            "Engines that failed to initialize",
        ),
        &["engine"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(WORKER_TIMEOUTS.clone()),
        Box::new(ENGINE_INIT_FAILURES.clone()),
    ]
}
