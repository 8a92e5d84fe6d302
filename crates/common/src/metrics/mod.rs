//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions for
//! the retrieval path and the knowledge-gap pipeline.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all Knowgap metrics
pub const METRICS_PREFIX: &str = "knowgap";

/// Register all metric descriptions
pub fn register_metrics() {
    // Retrieval metrics
    describe_counter!(
        format!("{}_chat_turns_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat turns that ran retrieval"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_sources_count", METRICS_PREFIX),
        Unit::Count,
        "Number of sources returned per chat turn"
    );

    // Gap pipeline metrics
    describe_counter!(
        format!("{}_unanswered_recorded_total", METRICS_PREFIX),
        Unit::Count,
        "Total questions recorded as unanswered"
    );

    describe_counter!(
        format!("{}_clusters_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total topic clusters created"
    );

    describe_counter!(
        format!("{}_cluster_alerts_total", METRICS_PREFIX),
        Unit::Count,
        "Total threshold-crossing alerts fired"
    );

    describe_counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        Unit::Count,
        "Total cluster resolutions completed"
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

    tracing::info!("Metrics registered");
}

/// Record a completed chat-turn retrieval
pub fn record_retrieval(duration_secs: f64, source_count: usize, answered: bool) {
    let verdict = if answered { "answered" } else { "unanswered" };

    counter!(
        format!("{}_chat_turns_total", METRICS_PREFIX),
        "verdict" => verdict
    )
    .increment(1);

    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_retrieval_sources_count", METRICS_PREFIX)).set(source_count as f64);
}

/// Record an unanswered question assignment
pub fn record_assignment(tenant_id: &str, created_cluster: bool) {
    counter!(
        format!("{}_unanswered_recorded_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string()
    )
    .increment(1);

    if created_cluster {
        counter!(
            format!("{}_clusters_created_total", METRICS_PREFIX),
            "tenant" => tenant_id.to_string()
        )
        .increment(1);
    }
}

/// Record a threshold-crossing alert
pub fn record_alert(tenant_id: &str, boundary: u32) {
    counter!(
        format!("{}_cluster_alerts_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string(),
        "boundary" => boundary.to_string()
    )
    .increment(1);
}

/// Record a completed resolution
pub fn record_resolution(tenant_id: &str, questions_folded: usize) {
    counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        "tenant" => tenant_id.to_string(),
        "questions" => questions_folded.to_string()
    )
    .increment(1);
}

/// Record an embedding call
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
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
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_helpers_do_not_panic() {
        register_metrics();
        record_retrieval(0.02, 3, true);
        record_assignment("tenant-a", true);
        record_alert("tenant-a", 5);
        record_resolution("tenant-a", 4);
        record_embedding(0.2, "mock-embedding", true);
        record_embedding(0.2, "mock-embedding", false);
    }
}
