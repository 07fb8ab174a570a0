//! Prometheus metrics for the Splice server.
//!
//! The `/metrics` endpoint is unauthenticated. Metrics carry no fingerprints or
//! file names, only aggregate counts and timings.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Chunk metrics
pub static CHUNKS_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("splice_chunks_stored_total", "Total number of chunks staged")
        .expect("metric creation failed")
});

pub static CHUNKS_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "splice_chunks_deduplicated_total",
        "Total number of chunk writes skipped because the index was already staged",
    )
    .expect("metric creation failed")
});

pub static BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "splice_bytes_stored_total",
        "Total bytes staged (new chunks only)",
    )
    .expect("metric creation failed")
});

pub static CHUNK_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "splice_chunk_upload_duration_seconds",
            "Time taken to stage a single chunk",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("metric creation failed")
});

// Upload metrics
pub static INSTANT_UPLOADS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "splice_instant_uploads_total",
        "Existence checks answered with an already published artifact",
    )
    .expect("metric creation failed")
});

pub static MERGES_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "splice_merges_completed_total",
        "Total number of successful merges",
    )
    .expect("metric creation failed")
});

pub static MERGE_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("splice_merge_failures_total", "Failed merges by error code"),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static MERGE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "splice_merge_duration_seconds",
            "Time taken to assemble and publish an artifact",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static SESSIONS_CANCELLED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "splice_sessions_cancelled_total",
        "Staging namespaces removed on client request",
    )
    .expect("metric creation failed")
});

// GC metrics
pub static GC_SWEEPS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("splice_gc_sweeps_total", "Completed stale-session sweeps")
        .expect("metric creation failed")
});

pub static GC_SESSIONS_REMOVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "splice_gc_sessions_removed_total",
        "Stale staging namespaces removed by the sweeper",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests can build as many routers as they like.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(CHUNKS_STORED.clone()),
            Box::new(CHUNKS_DEDUPLICATED.clone()),
            Box::new(BYTES_STORED.clone()),
            Box::new(CHUNK_UPLOAD_DURATION.clone()),
            Box::new(INSTANT_UPLOADS.clone()),
            Box::new(MERGES_COMPLETED.clone()),
            Box::new(MERGE_FAILURES.clone()),
            Box::new(MERGE_DURATION.clone()),
            Box::new(SESSIONS_CANCELLED.clone()),
            Box::new(GC_SWEEPS.clone()),
            Box::new(GC_SESSIONS_REMOVED.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
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

/// Helper to record merge failures by error code.
pub fn record_merge_failure(code: &str) {
    MERGE_FAILURES.with_label_values(&[code]).inc();
}
