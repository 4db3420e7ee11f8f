//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions. The gateway
//! installs the exporter; everything here only talks to the `metrics` facade.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DocQA metrics
pub const METRICS_PREFIX: &str = "docqa";

/// Buckets for completion latency (hosted LLM calls are slow)
pub const COMPLETION_BUCKETS: &[f64] = &[
    0.250,
    0.500,
    1.000,
    2.000,
    5.000,
    10.00,
    20.00,
    30.00,
    60.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Question metrics
    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Questions received, labelled by gate outcome"
    );

    describe_counter!(
        format!("{}_completions_total", METRICS_PREFIX),
        Unit::Count,
        "Completion provider calls"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Completion provider latency in seconds"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Context retrieval latency in seconds"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_files_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total uploaded files written to the working directory"
    );

    describe_gauge!(
        format!("{}_indexed_chunks", METRICS_PREFIX),
        Unit::Count,
        "Chunks in the current index"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Upload plus indexing latency in seconds"
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

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a question by gate outcome: "deflected", "answered" or "failed"
pub fn record_question(outcome: &'static str) {
    counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a completion provider call
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_completions_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Record a retrieval call
pub fn record_retrieval(duration_secs: f64, result_count: usize) {
    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    tracing::trace!(result_count, "Retrieval recorded");
}

/// Record embedding calls
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
    tracing::trace!(batch_size, success, "Embedding recorded");
}

/// Record an ingestion (upload written and indexed)
pub fn record_ingestion(duration_secs: f64, files_written: usize, chunks_indexed: usize) {
    counter!(format!("{}_files_ingested_total", METRICS_PREFIX)).increment(files_written as u64);

    gauge!(format!("{}_indexed_chunks", METRICS_PREFIX)).set(chunks_indexed as f64);

    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}
