//! API error types.
//!
//! Every variant maps to one outcome of the file lifecycle: callers can
//! distinguish "never existed" (404) from "existed and is now gone"
//! (410) from "try again later" (429).  The enum implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(ApiError::Gone { .. })`.  Backend failures are reported
//! generically to avoid leaking internal detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// File-sharing API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A request field is malformed (bad JSON, bad base64, bad value).
    #[error("{message}")]
    InvalidInput { message: String },

    /// The content type is not on the upload allow-list.
    #[error("Invalid file type")]
    UnsupportedContentType { content_type: String },

    /// The decoded payload exceeds the configured maximum.
    #[error("File too large (max {max_bytes} bytes)")]
    PayloadTooLarge { max_bytes: u64 },

    /// No record with that token exists.
    #[error("File not found or expired")]
    NotFound,

    /// The record existed but has expired (time or view limit). An
    /// expected terminal outcome, not a bug.
    #[error("{message}")]
    Gone { message: String },

    /// Password mismatch, or missing privileged credential.
    #[error("{message}")]
    Unauthorized { message: String },

    /// The caller's quota for this action and window is spent.
    #[error("{message}")]
    RateLimited { message: String },

    /// Backend connectivity/read/write failure, surfaced generically.
    #[error("We encountered an internal error, please try again.")]
    Storage(#[from] anyhow::Error),

    /// External format conversion failed. Non-fatal to the fetch itself;
    /// the view path degrades to serving the original bytes.
    #[error("Failed to convert notebook to HTML")]
    Conversion,
}

impl ApiError {
    /// Return the machine-readable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput { .. } => "InvalidInput",
            ApiError::UnsupportedContentType { .. } => "UnsupportedContentType",
            ApiError::PayloadTooLarge { .. } => "PayloadTooLarge",
            ApiError::NotFound => "NotFound",
            ApiError::Gone { .. } => "Gone",
            ApiError::Unauthorized { .. } => "Unauthorized",
            ApiError::RateLimited { .. } => "RateLimited",
            ApiError::Storage(_) => "StorageError",
            ApiError::Conversion => "ConversionError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedContentType { .. } => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Gone { .. } => StatusCode::GONE,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Conversion => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();

        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        })
        .to_string();

        (
            status,
            [
                ("content-type", "application/json".to_string()),
                ("x-request-id", request_id),
            ],
            body,
        )
            .into_response()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Gone {
                message: "File has expired".to_string()
            }
            .status_code(),
            StatusCode::GONE
        );
        assert_eq!(
            ApiError::RateLimited {
                message: "slow down".to_string()
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Storage(anyhow::anyhow!("db down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_error_message_is_generic() {
        // Backend detail must not leak into the caller-facing message.
        let err = ApiError::Storage(anyhow::anyhow!("connection refused to 10.0.0.3:5432"));
        assert!(!err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
