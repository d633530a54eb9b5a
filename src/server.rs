//! Axum router construction and route mapping.
//!
//! The [`app`] function wires the file-sharing API to its handlers and
//! returns a ready-to-serve [`axum::Router`].  The API surface is
//! deliberately small: upload, view (GET and HEAD), cleanup, plus the
//! health and metrics probes.

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::errors::generate_request_id;
use crate::handlers;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Build the axum [`Router`] with all API routes.
///
/// The `/health` and `/metrics` probes register only when enabled in
/// the observability config.  The returned router is ready to be passed
/// to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    // Base64 inflates payloads by ~4/3, plus JSON framing; give the raw
    // body limit headroom over the decoded-size cap.
    let body_limit = (state.config.server.max_upload_size as usize / 2).saturating_mul(3) + 4096;
    let cors = cors_layer(&state.config.cors.allowed_origin);
    let metrics_enabled = state.config.observability.metrics;
    let health_enabled = state.config.observability.health_check;

    let mut router = Router::new();
    if health_enabled {
        router = router.route("/health", get(health_check));
    }
    if metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    let router = router
        .route("/api/upload", post(handlers::upload::upload))
        .route(
            "/api/view",
            get(handlers::view::view).head(handlers::view::head_view),
        )
        .route("/api/cleanup", post(handlers::cleanup::cleanup))
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(cors)
        .layer(middleware::from_fn(common_headers_middleware));

    // metrics_middleware is outermost so it captures the full request
    // lifecycle.
    let router = if metrics_enabled {
        router.layer(middleware::from_fn(metrics_middleware))
    } else {
        router
    };

    router.layer(DefaultBodyLimit::max(body_limit))
}

// -- CORS ---------------------------------------------------------------------

/// Build the CORS layer from the configured origin ("*" allows any).
fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let origin = if allowed_origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(allowed_origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => AllowOrigin::any(),
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::HEAD, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("x-password-hash"),
        ])
}

// -- Common headers middleware -----------------------------------------------

/// Tower middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `Vanish`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Only set x-request-id if not already present (error responses set it).
    if !headers.contains_key("x-request-id") {
        let request_id = generate_request_id();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("Vanish"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}
