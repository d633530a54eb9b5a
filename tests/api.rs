//! End-to-end API tests against the in-memory backends.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use vanish::config::Config;
use vanish::metadata::memory::MemoryMetadataStore;
use vanish::ratelimit::RateLimiter;
use vanish::server::app;
use vanish::storage::memory::MemoryBackend;
use vanish::AppState;

fn test_config() -> Config {
    let yaml = r#"
cleanup:
  secret: "sweep-secret"
rate_limits:
  upload:
    limit: 100
    window_secs: 3600
  view:
    limit: 100
    window_secs: 3600
"#;
    serde_yaml::from_str(yaml).expect("test config parses")
}

fn test_app(config: Config) -> Router {
    let metadata: Arc<dyn vanish::metadata::store::MetadataStore> =
        Arc::new(MemoryMetadataStore::new());
    let storage: Arc<dyn vanish::storage::backend::BlobBackend> = Arc::new(MemoryBackend::new(0));
    let limiter = RateLimiter::new(
        metadata.clone(),
        config.rate_limits.upload,
        config.rate_limits.view,
    );
    app(Arc::new(AppState {
        config,
        metadata,
        storage,
        limiter,
    }))
}

fn upload_body(content: &[u8]) -> Value {
    json!({
        "filename": "note.txt",
        "fileType": "text/plain",
        "fileData": base64::engine::general_purpose::STANDARD.encode(content),
    })
}

async fn post_upload(router: &Router, body: &Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/upload")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get_view(router: &Router, token: &str, password_hash: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut request = Request::get(format!("/api/view?token={token}"));
    if let Some(hash) = password_hash {
        request = request.header("x-password-hash", hash);
    }
    let response = router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn test_upload_view_then_gone() {
    let router = test_app(test_config());

    let (status, body) = post_upload(&router, &upload_body(b"hello world")).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().expect("token in response");

    // First view serves the exact bytes.
    let (status, bytes) = get_view(&router, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"hello world");

    // Default view budget is one; a second view is gone forever.
    let (status, _) = get_view(&router, token, None).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_view_response_headers() {
    let router = test_app(test_config());

    let mut body = upload_body(b"data");
    body["allowDownloads"] = json!(true);
    let (_, response) = post_upload(&router, &body).await;
    let token = response["token"].as_str().unwrap();

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/view?token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/plain");
    assert_eq!(
        headers["content-disposition"],
        "inline; filename=\"note.txt\""
    );
    assert_eq!(headers["cache-control"], "no-store");
    assert_eq!(headers["x-is-encrypted"], "false");
    assert_eq!(headers["x-allow-downloads"], "true");
    // Not sent in the body, so the false default applies.
    assert_eq!(headers["x-allow-copying"], "false");
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["server"], "Vanish");
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let router = test_app(test_config());
    let (status, _) = get_view(&router, "no-such-token", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_password_gate() {
    let router = test_app(test_config());

    let mut body = upload_body(b"secret bytes");
    body["passwordHash"] = json!("cafebabe");
    let (_, response) = post_upload(&router, &body).await;
    let token = response["token"].as_str().unwrap();

    // Missing and wrong passwords are rejected without spending the view.
    let (status, _) = get_view(&router, token, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = get_view(&router, token, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The correct hash still gets the single budgeted view.
    let (status, bytes) = get_view(&router, token, Some("cafebabe")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"secret bytes");
}

#[tokio::test]
async fn test_head_spends_no_view() {
    let router = test_app(test_config());

    let (_, response) = post_upload(&router, &upload_body(b"peek")).await;
    let token = response["token"].as_str().unwrap();

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(
                Request::head(format!("/api/view?token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-is-encrypted"], "false");
    }

    // The single budgeted view is still available after the HEADs.
    let (status, bytes) = get_view(&router, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"peek");
}

#[tokio::test]
async fn test_null_max_views_still_defaults_to_single_view() {
    let router = test_app(test_config());

    let mut body = upload_body(b"once");
    body["maxViews"] = json!(null);
    let (status, response) = post_upload(&router, &body).await;
    assert_eq!(status, StatusCode::OK);
    let token = response["token"].as_str().unwrap();

    // Explicit null is not a back door to unlimited views.
    let (status, bytes) = get_view(&router, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"once");
    let (status, _) = get_view(&router, token, None).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_past_expiry_is_gone() {
    let router = test_app(test_config());

    let mut body = upload_body(b"old");
    body["expiresAt"] = json!((Utc::now() - Duration::hours(1)).to_rfc3339());
    let (status, response) = post_upload(&router, &body).await;
    assert_eq!(status, StatusCode::OK);
    let token = response["token"].as_str().unwrap();

    let (status, _) = get_view(&router, token, None).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_rejected_content_type() {
    let router = test_app(test_config());

    let mut body = upload_body(b"PK\x03\x04");
    body["fileType"] = json!("application/zip");
    let (status, response) = post_upload(&router, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "UnsupportedContentType");
}

#[tokio::test]
async fn test_oversized_payload_rejected() {
    let mut config = test_config();
    config.server.max_upload_size = 8;
    let router = test_app(config);

    let (status, response) = post_upload(&router, &upload_body(b"nine bytes")).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(response["error"], "PayloadTooLarge");
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let router = test_app(test_config());

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/upload")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = upload_body(b"x");
    body["fileData"] = json!("@@not-base64@@");
    let (status, response) = post_upload(&router, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["message"], "Invalid file data");
}

#[tokio::test]
async fn test_view_rate_limit() {
    let mut config = test_config();
    config.rate_limits.view.limit = 2;
    let router = test_app(config);

    let (_, _) = get_view(&router, "whatever", None).await;
    let (_, _) = get_view(&router, "whatever", None).await;

    // Third request from the same (unknown) identity in the window.
    let (status, _) = get_view(&router, "whatever", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_cleanup_requires_secret() {
    let router = test_app(test_config());

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/cleanup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/cleanup")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cleanup_purges_expired_and_is_idempotent() {
    let router = test_app(test_config());

    // One record that expires immediately, one that stays alive.
    let mut dead = upload_body(b"dead");
    dead["expiresAt"] = json!((Utc::now() - Duration::minutes(5)).to_rfc3339());
    post_upload(&router, &dead).await;
    let (_, alive) = post_upload(&router, &upload_body(b"alive")).await;
    let alive_token = alive["token"].as_str().unwrap().to_string();

    let sweep = |router: Router| async move {
        let response = router
            .oneshot(
                Request::post("/api/cleanup")
                    .header("authorization", "Bearer sweep-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice::<Value>(&bytes).unwrap()
    };

    // First sweep only promotes the stale record; the purge happens on
    // the following run.
    let first = sweep(router.clone()).await;
    assert_eq!(first["success"], true);
    assert_eq!(first["records_promoted"], 1);
    assert_eq!(first["metadata_deleted"], 0);

    let second = sweep(router.clone()).await;
    assert_eq!(second["records_promoted"], 0);
    assert_eq!(second["metadata_deleted"], 1);

    let third = sweep(router.clone()).await;
    assert_eq!(third["metadata_deleted"], 0);
    assert_eq!(third["total_files_deleted"], 0);

    // The live record survived both sweeps.
    let (status, bytes) = get_view(&router, &alive_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"alive");
}

#[tokio::test]
async fn test_health() {
    let router = test_app(test_config());
    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], br#"{"status":"ok"}"#);
}

#[tokio::test]
async fn test_disabled_observability_routes_are_absent() {
    let mut config = test_config();
    config.observability.metrics = false;
    config.observability.health_check = false;
    let router = test_app(config);

    for path in ["/health", "/metrics"] {
        let response = router
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }

    // The API itself is unaffected.
    let (status, _) = post_upload(&router, &upload_body(b"still works")).await;
    assert_eq!(status, StatusCode::OK);
}
