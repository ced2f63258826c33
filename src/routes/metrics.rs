use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "analysis_jobs_submitted_total",
        "Analysis jobs created, by profile"
    );
    metrics::describe_counter!(
        "analysis_job_items_created_total",
        "Job items written to the store"
    );
    metrics::describe_counter!(
        "dispatch_batches_sent_total",
        "Batches accepted by the compute worker"
    );
    metrics::describe_counter!(
        "dispatch_failures_total",
        "Batches that were dropped or rejected, by reason"
    );
    metrics::describe_gauge!(
        "dispatch_queue_depth",
        "Batches waiting in the dispatch queue"
    );
    metrics::describe_histogram!(
        "dispatch_request_seconds",
        "Compute worker request latency"
    );
    metrics::describe_counter!(
        "job_status_transitions_total",
        "Persisted job status transitions, by target status"
    );
    metrics::describe_counter!("image_rejections_total", "Image rejections recorded");
}
