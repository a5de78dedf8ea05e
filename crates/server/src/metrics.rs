//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the briefsmith server:
//! - HTTP request metrics (latency, counts)
//! - Submission rejections
//! - Job registry size (collected dynamically)
//!
//! Pipeline metrics live in `briefsmith_core::metrics` and are registered here.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

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
            "briefsmith_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .expect("valid http duration metric")
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("briefsmith_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("valid http requests metric")
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "briefsmith_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .expect("valid in-flight metric")
});

/// Submissions refused before a job was created.
pub static SUBMISSIONS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "briefsmith_submissions_rejected_total",
            "Job submissions refused at the API",
        ),
        &["reason"],
    )
    .expect("valid rejection metric")
});

// =============================================================================
// Registry Metrics (collected dynamically)
// =============================================================================

/// Jobs held by the registry, by state.
pub static JOBS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("briefsmith_jobs_by_state", "Current job count by state"),
        &["state"],
    )
    .expect("valid jobs-by-state metric")
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let local: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(SUBMISSIONS_REJECTED.clone()),
        Box::new(JOBS_BY_STATE.clone()),
    ];

    for metric in local
        .into_iter()
        .chain(briefsmith_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(metric) {
            tracing::warn!(error = %e, "Failed to register metric");
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the per-state gauges reflect the registry.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let jobs = state.driver().registry().list().await;
    for job_state in ["queued", "processing", "completed", "failed"] {
        let count = jobs.iter().filter(|j| j.state.as_str() == job_state).count();
        JOBS_BY_STATE
            .with_label_values(&[job_state])
            .set(count as i64);
    }
}

static UUID_SEGMENT: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .expect("valid uuid regex")
});

static TEMPLATE_USER: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(r"^/api/v1/templates/[^/]+(/document)?$").expect("valid template regex")
});

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    if TEMPLATE_USER.is_match(path) {
        return TEMPLATE_USER
            .replace(path, "/api/v1/templates/{user}$1")
            .to_string();
    }
    UUID_SEGMENT.replace_all(path, "{id}").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/jobs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/jobs/{id}");
    }

    #[test]
    fn test_normalize_path_template_user() {
        assert_eq!(
            normalize_path("/api/v1/templates/alice"),
            "/api/v1/templates/{user}"
        );
        assert_eq!(
            normalize_path("/api/v1/templates/alice/document"),
            "/api/v1/templates/{user}/document"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("briefsmith_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_includes_core_metrics() {
        briefsmith_core::metrics::JOBS_SUBMITTED.inc();
        JOBS_BY_STATE.with_label_values(&["queued"]).set(0);

        let output = encode_metrics();
        assert!(output.contains("briefsmith_jobs_submitted_total"));
        assert!(output.contains("briefsmith_jobs_by_state"));
    }
}
