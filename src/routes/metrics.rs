use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics: Prometheus text exposition of the pipeline counters.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the pipeline emits.
pub fn describe() {
    metrics::describe_counter!("photos_received_total", "Photos accepted for verification");
    metrics::describe_counter!(
        "photo_verdicts_total",
        "Photo verdicts recorded, labelled by status"
    );
    metrics::describe_histogram!(
        "photo_processing_seconds",
        "Time from dequeue to recorded outcome for one photo"
    );
    metrics::describe_counter!("jobs_completed_total", "Jobs whose checklist finished");
    metrics::describe_counter!(
        "notifications_failed_total",
        "Outbound replies that could not be delivered"
    );
    metrics::describe_counter!(
        "photo_errors_total",
        "Photos rejected or errored, labelled by kind"
    );
}
