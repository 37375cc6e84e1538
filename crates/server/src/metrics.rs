//! Prometheus metrics for the filegate gateway.
//!
//! Exposes request outcomes, streamed bytes, cache effectiveness, and
//! upstream latency.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no tokens or resource identifiers, only aggregate counts.
//! Restrict it to scraper networks at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Request metrics
pub static GATEWAY_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "filegate_gateway_requests_total",
            "Gateway requests by serve mode and outcome",
        ),
        &["mode", "outcome"],
    )
    .expect("metric creation failed")
});

pub static BYTES_STREAMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "filegate_bytes_streamed_total",
        "Total bytes proxied from the upstream to clients",
    )
    .expect("metric creation failed")
});

pub static SIGNATURE_MISMATCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "filegate_signature_mismatches_total",
        "Tokens rejected because the signature did not verify",
    )
    .expect("metric creation failed")
});

// Cache metrics
pub static CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "filegate_metadata_cache_hits_total",
        "Descriptor lookups answered from the cache",
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "filegate_metadata_cache_misses_total",
        "Descriptor lookups that went to the upstream",
    )
    .expect("metric creation failed")
});

pub static CACHE_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "filegate_metadata_cache_entries",
        "Current number of cached descriptors",
    )
    .expect("metric creation failed")
});

// Upstream metrics
pub static UPSTREAM_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "filegate_upstream_errors_total",
            "Upstream failures by stage",
        ),
        &["stage"],
    )
    .expect("metric creation failed")
});

pub static UPSTREAM_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "filegate_upstream_duration_seconds",
            "Time until the upstream answered, by stage",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["stage"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(GATEWAY_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_STREAMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SIGNATURE_MISMATCHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_ENTRIES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPSTREAM_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPSTREAM_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record the outcome of one gateway request.
pub fn record_request(mode: &str, outcome: &str) {
    GATEWAY_REQUESTS.with_label_values(&[mode, outcome]).inc();
}

/// Record an upstream failure for a stage (`metadata`, `locator`, `bytes`).
pub fn record_upstream_error(stage: &str) {
    UPSTREAM_ERRORS.with_label_values(&[stage]).inc();
}
