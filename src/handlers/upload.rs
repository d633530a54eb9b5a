//! Upload handler.
//!
//! `POST /api/upload` accepts a JSON body with a base64 payload,
//! validates it against the content-type allow-list and size cap,
//! places the bytes by size, and persists the metadata record under a
//! freshly generated opaque token.  The token is the only reply; it is
//! never derived from the content.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use garde::Validate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::handlers::REQUEST_DEADLINE;
use crate::metadata::store::{FileRecord, FileStatus, PayloadLocation};
use crate::metrics::UPLOADS_TOTAL;
use crate::payload;
use crate::ratelimit::{client_identity, Action};
use crate::AppState;

/// Content types accepted for upload.
pub const VALID_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/x-ipynb+json",
    "text/plain",
    "text/markdown",
    "text/html",
    "text/css",
    "text/x-latex",
    "text/javascript",
    "application/javascript",
    "text/x-jsx",
    "text/x-tsx",
    "text/x-python",
    "text/x-csrc",
    "text/x-c++src",
    "text/x-java-source",
    "text/x-go",
    "text/x-ruby",
    "text/x-php",
    "text/x-shellscript",
    "text/x-typescript",
    "text/x-rustsrc",
    "text/x-r",
    "text/x-powershell",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "video/mp4",
    "video/webm",
    "video/ogg",
];

/// Default retention when the client sets no expiry: 72 hours.
const DEFAULT_TTL_HOURS: i64 = 72;

/// Upload request body.  Field names are camelCase on the wire
/// (`fileType`, `fileData`, `maxViews`, ...).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[garde(length(min = 1, max = 255))]
    pub filename: String,

    #[garde(skip)]
    pub file_type: String,

    /// Base64-encoded payload bytes.
    #[garde(skip)]
    pub file_data: String,

    #[garde(skip)]
    #[serde(default)]
    pub allow_downloads: bool,

    #[garde(skip)]
    #[serde(default)]
    pub allow_copying: bool,

    /// Absolute expiry; defaults to upload time + 72 hours.
    #[garde(skip)]
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// View budget.  Omitted and explicit null both mean the default of
    /// one view; unlimited records cannot be minted through the API.
    #[garde(skip)]
    #[serde(default)]
    pub max_views: Option<u32>,

    /// Client-side password hash; presence marks the record encrypted.
    #[garde(skip)]
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Upload response body.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub token: String,
}

/// `POST /api/upload`
pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let identity = client_identity(&headers);
    state.limiter.check(&identity, Action::Upload).await?;

    let request: UploadRequest =
        serde_json::from_slice(&body).map_err(|err| ApiError::InvalidInput {
            message: format!("Invalid request body: {err}"),
        })?;
    request.validate().map_err(|err| ApiError::InvalidInput {
        message: format!("Invalid request: {err}"),
    })?;

    if !VALID_CONTENT_TYPES.contains(&request.file_type.as_str()) {
        return Err(ApiError::UnsupportedContentType {
            content_type: request.file_type,
        });
    }

    let data = base64::engine::general_purpose::STANDARD
        .decode(&request.file_data)
        .map_err(|_| ApiError::InvalidInput {
            message: "Invalid file data".to_string(),
        })?;

    // Size is judged on the decoded bytes, not the base64 transport form.
    let max = state.config.server.max_upload_size;
    if data.len() as u64 > max {
        return Err(ApiError::PayloadTooLarge { max_bytes: max });
    }

    tokio::time::timeout(REQUEST_DEADLINE, persist(&state, request, Bytes::from(data)))
        .await
        .map_err(|_| ApiError::Storage(anyhow::anyhow!("upload deadline exceeded")))?
}

/// Place the payload, then write the metadata record.
///
/// Ordering matters: bytes land before the record that points at them,
/// so a crash in between leaves an orphaned blob for the sweep, never a
/// record with missing bytes.
async fn persist(
    state: &Arc<AppState>,
    request: UploadRequest,
    data: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let location = payload::store_payload(state.storage.as_ref(), data).await?;
    let storage_kind = if location.is_blob() { "blob" } else { "inline" };

    let record = build_record(request, location);
    let token = record.token.clone();
    state.metadata.create_record(record).await?;

    counter!(UPLOADS_TOTAL, "storage" => storage_kind).increment(1);
    info!(token = %token, storage = storage_kind, "file uploaded");

    Ok(Json(UploadResponse { token }))
}

/// Assemble the metadata record, applying lifecycle defaults.
fn build_record(request: UploadRequest, location: PayloadLocation) -> FileRecord {
    let now = Utc::now();
    let is_encrypted = request
        .password_hash
        .as_deref()
        .is_some_and(|h| !h.is_empty());

    FileRecord {
        token: Uuid::new_v4().to_string(),
        filename: request.filename,
        content_type: request.file_type,
        payload: location,
        allow_downloads: request.allow_downloads,
        allow_copying: request.allow_copying,
        created_at: now,
        expires_at: request
            .expires_at
            .unwrap_or_else(|| now + Duration::hours(DEFAULT_TTL_HOURS)),
        max_views: Some(request.max_views.unwrap_or(1)),
        current_views: 0,
        status: FileStatus::Active,
        password_hash: request.password_hash.filter(|h| !h.is_empty()),
        is_encrypted,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> UploadRequest {
        serde_json::from_str(json).unwrap()
    }

    fn inline() -> PayloadLocation {
        PayloadLocation::Inline(Bytes::from_static(b"hi"))
    }

    #[test]
    fn test_defaults_applied() {
        let request = parse(r#"{"filename":"a.txt","fileType":"text/plain","fileData":"aGk="}"#);
        let record = build_record(request, inline());

        assert_eq!(record.max_views, Some(1));
        assert!(!record.allow_downloads);
        assert!(!record.allow_copying);
        assert!(!record.is_encrypted);
        assert_eq!(record.status, FileStatus::Active);
        let ttl = record.expires_at - record.created_at;
        assert_eq!(ttl, Duration::hours(72));
    }

    #[test]
    fn test_body_fields_are_camel_case() {
        // snake_case keys are not accepted for the renamed fields.
        let result = serde_json::from_str::<UploadRequest>(
            r#"{"filename":"a.txt","content_type":"text/plain","data":"aGk="}"#,
        );
        assert!(result.is_err());

        let request = parse(
            r#"{"filename":"a.txt","fileType":"text/plain","fileData":"aGk=","allowDownloads":true,"maxViews":3}"#,
        );
        assert!(request.allow_downloads);
        assert_eq!(request.max_views, Some(3));
    }

    #[test]
    fn test_explicit_null_max_views_defaults_to_one() {
        let request = parse(
            r#"{"filename":"a.txt","fileType":"text/plain","fileData":"aGk=","maxViews":null}"#,
        );
        let record = build_record(request, inline());
        assert_eq!(record.max_views, Some(1));
    }

    #[test]
    fn test_explicit_max_views() {
        let request = parse(
            r#"{"filename":"a.txt","fileType":"text/plain","fileData":"aGk=","maxViews":5}"#,
        );
        let record = build_record(request, inline());
        assert_eq!(record.max_views, Some(5));
    }

    #[test]
    fn test_tokens_are_unique_and_opaque() {
        let a = build_record(
            parse(r#"{"filename":"a.txt","fileType":"text/plain","fileData":"aGk="}"#),
            inline(),
        );
        let b = build_record(
            parse(r#"{"filename":"a.txt","fileType":"text/plain","fileData":"aGk="}"#),
            inline(),
        );
        // Identical content never produces identical tokens.
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_password_hash_marks_encrypted() {
        let request = parse(
            r#"{"filename":"a.txt","fileType":"text/plain","fileData":"aGk=","passwordHash":"deadbeef"}"#,
        );
        let record = build_record(request, inline());
        assert!(record.is_encrypted);
        assert_eq!(record.password_hash.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_empty_password_hash_is_not_encrypted() {
        let request = parse(
            r#"{"filename":"a.txt","fileType":"text/plain","fileData":"aGk=","passwordHash":""}"#,
        );
        let record = build_record(request, inline());
        assert!(!record.is_encrypted);
        assert_eq!(record.password_hash, None);
    }

    #[test]
    fn test_filename_length_validation() {
        let request = parse(r#"{"filename":"","fileType":"text/plain","fileData":"aGk="}"#);
        assert!(request.validate().is_err());

        let long = "x".repeat(256);
        let request = parse(&format!(
            r#"{{"filename":"{long}","fileType":"text/plain","fileData":"aGk="}}"#
        ));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_content_type_allow_list() {
        assert!(VALID_CONTENT_TYPES.contains(&"application/pdf"));
        assert!(VALID_CONTENT_TYPES.contains(&"application/x-ipynb+json"));
        assert!(VALID_CONTENT_TYPES.contains(&"image/svg+xml"));
        assert!(!VALID_CONTENT_TYPES.contains(&"application/zip"));
        assert!(!VALID_CONTENT_TYPES.contains(&"application/octet-stream"));
    }
}
