//! View handler.
//!
//! `GET /api/view?token=...` serves a file exactly while it is alive:
//! the expiry policy is consulted before anything else, stale Active
//! records are lazily flipped to Expired, the password gate runs before
//! a view is spent, and the view itself is counted by the store's
//! atomic increment so concurrent requests can never overshoot the
//! budget.  `HEAD` answers with metadata headers only and spends
//! nothing.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use metrics::counter;
use serde::Deserialize;
use tracing::{info, warn};

use crate::access;
use crate::convert::{self, NOTEBOOK_CONTENT_TYPE};
use crate::errors::ApiError;
use crate::expiry::{self, Disposition};
use crate::handlers::REQUEST_DEADLINE;
use crate::metadata::store::{FileRecord, ViewOutcome};
use crate::metrics::{EXPIRED_REJECTIONS_TOTAL, VIEWS_TOTAL};
use crate::payload;
use crate::ratelimit::{client_identity, Action};
use crate::AppState;

/// View request query string.
#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    pub token: String,
}

/// `GET /api/view?token=...`
pub async fn view(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = client_identity(&headers);
    state.limiter.check(&identity, Action::View).await?;

    let provided_hash = password_hash_header(&headers);
    let (record, data) = tokio::time::timeout(
        REQUEST_DEADLINE,
        load_and_spend_view(&state, &query.token, provided_hash.as_deref()),
    )
    .await
    .map_err(|_| ApiError::Storage(anyhow::anyhow!("view deadline exceeded")))??;

    // Notebooks are rendered to HTML for display; conversion runs on
    // its own timeout and degrades to the raw bytes on any failure.
    let (data, content_type, filename) = if record.content_type == NOTEBOOK_CONTENT_TYPE {
        match convert::notebook_to_html(&data, &record.filename).await {
            Ok(converted) => (converted.data, converted.content_type, converted.filename),
            Err(_) => {
                warn!(token = %record.token, "notebook conversion failed, serving raw bytes");
                (data, record.content_type.clone(), record.filename.clone())
            }
        }
    } else {
        (data, record.content_type.clone(), record.filename.clone())
    };

    counter!(VIEWS_TOTAL).increment(1);
    info!(token = %record.token, views = record.current_views, "file viewed");

    let mut response = (StatusCode::OK, data).into_response();
    apply_file_headers(response.headers_mut(), &record, &content_type, &filename);
    Ok(response)
}

/// `HEAD /api/view?token=...` -- metadata headers only, no view spent.
pub async fn head_view(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = client_identity(&headers);
    state.limiter.check(&identity, Action::View).await?;

    let provided_hash = password_hash_header(&headers);
    let record = tokio::time::timeout(
        REQUEST_DEADLINE,
        load_alive(&state, &query.token, provided_hash.as_deref()),
    )
    .await
    .map_err(|_| ApiError::Storage(anyhow::anyhow!("view deadline exceeded")))??;

    let mut response = StatusCode::OK.into_response();
    apply_file_headers(
        response.headers_mut(),
        &record,
        &record.content_type,
        &record.filename,
    );
    Ok(response)
}

/// Fetch the record, enforce expiry and the password gate.
///
/// Any expired outcome on a record still marked Active is written back
/// (self-healing) so later reads short-circuit.
async fn load_alive(
    state: &Arc<AppState>,
    token: &str,
    provided_hash: Option<&str>,
) -> Result<FileRecord, ApiError> {
    let record = state
        .metadata
        .get_by_token(token)
        .await?
        .ok_or(ApiError::NotFound)?;

    let disposition = expiry::evaluate(&record, Utc::now());
    if disposition.is_expired() {
        if disposition != Disposition::AlreadyExpired {
            state.metadata.mark_expired(token).await?;
        }
        let (reason, message) = match disposition {
            Disposition::ExpiredByViewLimit => ("views", "View limit reached"),
            _ => ("time", "File has expired"),
        };
        counter!(EXPIRED_REJECTIONS_TOTAL, "reason" => reason).increment(1);
        return Err(ApiError::Gone {
            message: message.to_string(),
        });
    }

    // The gate runs before any view is spent, so a wrong password never
    // burns budget.
    access::check(&record, provided_hash)?;
    Ok(record)
}

/// [`load_alive`] plus the atomic view spend and payload fetch.
async fn load_and_spend_view(
    state: &Arc<AppState>,
    token: &str,
    provided_hash: Option<&str>,
) -> Result<(FileRecord, Bytes), ApiError> {
    load_alive(state, token, provided_hash).await?;

    let record = match state.metadata.record_view_and_maybe_expire(token).await? {
        ViewOutcome::Recorded(record) => record,
        ViewOutcome::Exhausted => {
            counter!(EXPIRED_REJECTIONS_TOTAL, "reason" => "views").increment(1);
            return Err(ApiError::Gone {
                message: "View limit reached".to_string(),
            });
        }
        ViewOutcome::NotFound => return Err(ApiError::NotFound),
    };

    let data = payload::fetch_payload(state.storage.as_ref(), &record).await?;
    Ok((record, data))
}

fn password_hash_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-password-hash")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Set the file response headers shared by GET and HEAD.
fn apply_file_headers(
    headers: &mut HeaderMap,
    record: &FileRecord,
    content_type: &str,
    filename: &str,
) {
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    let disposition = format!("inline; filename=\"{}\"", filename.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    // Ephemeral content must never outlive its record in a cache.
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        "x-is-encrypted",
        HeaderValue::from_static(if record.is_encrypted { "true" } else { "false" }),
    );
    headers.insert(
        "x-allow-downloads",
        HeaderValue::from_static(if record.allow_downloads { "true" } else { "false" }),
    );
    headers.insert(
        "x-allow-copying",
        HeaderValue::from_static(if record.allow_copying { "true" } else { "false" }),
    );
}

// ── Tests ───────────────────────────────────────────────────────────
