//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with latency-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all TaxLex metrics
pub const METRICS_PREFIX: &str = "taxlex";

/// Histogram buckets for retrieval latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
];

/// Buckets for embedding latency (typically slower)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Buckets for full index builds
pub const BUILD_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0];

/// Histogram names paired with their bucket boundaries, for exporter setup
pub fn histogram_buckets() -> Vec<(String, &'static [f64])> {
    vec![
        (format!("{}_retrieval_duration_seconds", METRICS_PREFIX), LATENCY_BUCKETS),
        (format!("{}_embedding_duration_seconds", METRICS_PREFIX), EMBEDDING_BUCKETS),
        (format!("{}_index_build_duration_seconds", METRICS_PREFIX), BUILD_BUCKETS),
    ]
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Retrieval metrics
    describe_counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of retrieval queries"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_passages_count", METRICS_PREFIX),
        Unit::Count,
        "Number of passages in the last assembled context"
    );

    describe_counter!(
        format!("{}_retrieval_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Queries that needed fallback searches"
    );

    describe_counter!(
        format!("{}_retrieval_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Queries that failed, by stage"
    );

    // Classification metrics
    describe_counter!(
        format!("{}_classifications_total", METRICS_PREFIX),
        Unit::Count,
        "Classified queries by category"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Index metrics
    describe_histogram!(
        format!("{}_index_build_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Index generation build time in seconds"
    );

    describe_gauge!(
        format!("{}_index_passages", METRICS_PREFIX),
        Unit::Count,
        "Passages in the published index generation"
    );

    describe_counter!(
        format!("{}_index_failed_batches_total", METRICS_PREFIX),
        Unit::Count,
        "Embedding batches replaced by zero vectors"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record retrieval metrics
pub struct RetrievalMetrics {
    start: Instant,
}

impl RetrievalMetrics {
    /// Start tracking a query
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Record a completed query
    pub fn finish(self, category: &str, passage_count: usize, fallback_used: bool) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_retrieval_queries_total", METRICS_PREFIX),
            "category" => category.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
            "category" => category.to_string()
        )
        .record(duration);

        gauge!(
            format!("{}_retrieval_passages_count", METRICS_PREFIX),
            "category" => category.to_string()
        )
        .set(passage_count as f64);

        if fallback_used {
            counter!(
                format!("{}_retrieval_fallbacks_total", METRICS_PREFIX),
                "category" => category.to_string()
            )
            .increment(1);
        }
    }

    /// Record a failed query
    pub fn fail(self, stage: &str) {
        counter!(
            format!("{}_retrieval_errors_total", METRICS_PREFIX),
            "stage" => stage.to_string()
        )
        .increment(1);
    }
}

/// Helper to record classification metrics
pub fn record_classification(category: &str, degraded: bool) {
    counter!(
        format!("{}_classifications_total", METRICS_PREFIX),
        "category" => category.to_string(),
        "degraded" => degraded.to_string()
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(batch_size as u64);
    }
}

/// Helper to record index build metrics
pub fn record_index_build(duration_secs: f64, passages: usize, failed_batches: usize) {
    histogram!(format!("{}_index_build_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_index_passages", METRICS_PREFIX)).set(passages as f64);

    counter!(format!("{}_index_failed_batches_total", METRICS_PREFIX))
        .increment(failed_batches as u64);
}
