//! Prometheus metrics for Vanish.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "vanish_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vanish_http_request_duration_seconds";

/// Total accepted uploads (counter). Labels: storage ("inline" or "blob").
pub const UPLOADS_TOTAL: &str = "vanish_uploads_total";

/// Total served views (counter).
pub const VIEWS_TOTAL: &str = "vanish_views_total";

/// Total records rejected as expired at view time (counter). Labels: reason.
pub const EXPIRED_REJECTIONS_TOTAL: &str = "vanish_expired_rejections_total";

/// Total requests rejected by rate limiting (counter). Labels: action.
pub const RATE_LIMITED_TOTAL: &str = "vanish_rate_limited_total";

/// Total files removed by cleanup sweeps (counter).
pub const SWEEP_FILES_DELETED_TOTAL: &str = "vanish_sweep_files_deleted_total";

/// Total cleanup sweeps executed (counter).
pub const SWEEPS_TOTAL: &str = "vanish_sweeps_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(UPLOADS_TOTAL, "Total accepted uploads");
    describe_counter!(VIEWS_TOTAL, "Total served views");
    describe_counter!(
        EXPIRED_REJECTIONS_TOTAL,
        "Total view requests rejected because the record had expired"
    );
    describe_counter!(RATE_LIMITED_TOTAL, "Total requests rejected by rate limiting");
    describe_counter!(
        SWEEP_FILES_DELETED_TOTAL,
        "Total files removed by cleanup sweeps"
    );
    describe_counter!(SWEEPS_TOTAL, "Total cleanup sweeps executed");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    // Do not instrument the metrics endpoint itself.
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize an actual request path to a route template for metric labels.
///
/// The API surface is a fixed set of routes, so anything unrecognized is
/// collapsed into one label to keep cardinality bounded.
fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/metrics" | "/api/upload" | "/api/view" | "/api/cleanup" => {
            path.to_string()
        }
        _ => "/{unknown}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> impl IntoResponse {
    let handle = PROMETHEUS_HANDLE
        .get()
        .expect("Prometheus recorder not initialized");
    let body = handle.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

// -- Tests --------------------------------------------------------------------
