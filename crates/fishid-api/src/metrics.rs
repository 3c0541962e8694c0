//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use uuid::Uuid;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "fishid_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "fishid_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "fishid_http_requests_in_flight";

    // Queue metrics
    pub const QUEUE_LENGTH: &str = "fishid_queue_length";
    pub const QUEUE_DLQ_LENGTH: &str = "fishid_queue_dlq_length";

    // Pipeline entry metrics
    pub const UPLOAD_GRANTS_TOTAL: &str = "fishid_upload_grants_total";
    pub const EVENTS_ACCEPTED_TOTAL: &str = "fishid_events_accepted_total";
    pub const EVENTS_REJECTED_TOTAL: &str = "fishid_events_rejected_total";

    // Security metrics
    pub const AUTH_FAILURES_TOTAL: &str = "fishid_auth_failures_total";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "fishid_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Update queue length gauge.
pub fn set_queue_length(length: u64) {
    gauge!(names::QUEUE_LENGTH).set(length as f64);
}

/// Update DLQ length gauge.
pub fn set_dlq_length(length: u64) {
    gauge!(names::QUEUE_DLQ_LENGTH).set(length as f64);
}

pub fn record_upload_grant() {
    counter!(names::UPLOAD_GRANTS_TOTAL).increment(1);
}

pub fn record_events(accepted: usize, rejected: usize) {
    counter!(names::EVENTS_ACCEPTED_TOTAL).increment(accepted as u64);
    counter!(names::EVENTS_REJECTED_TOTAL).increment(rejected as u64);
}

pub fn record_auth_failure() {
    counter!(names::AUTH_FAILURES_TOTAL).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let mut previous = "";
    let segments: Vec<&str> = path
        .split('/')
        .map(|segment| {
            let replaced = if previous == "results" && !segment.is_empty() {
                ":work_item_id"
            } else if Uuid::parse_str(segment).is_ok()
                || (!segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()))
            {
                ":id"
            } else {
                segment
            };
            previous = segment;
            replaced
        })
        .collect();
    segments.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
