//! Cleanup handler.
//!
//! `POST /api/cleanup` triggers a sweep of expired records.  The caller
//! must present the configured bearer secret; an empty configured
//! secret disables the endpoint rather than leaving it open.  The
//! sweep itself is idempotent, so schedulers may fire it as often as
//! they like.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use metrics::counter;
use subtle::ConstantTimeEq;

use crate::errors::ApiError;
use crate::handlers::SWEEP_DEADLINE;
use crate::metrics::{SWEEPS_TOTAL, SWEEP_FILES_DELETED_TOTAL};
use crate::sweeper::{self, SweepSummary};
use crate::AppState;

/// `POST /api/cleanup`
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepSummary>, ApiError> {
    authorize(&state.config.cleanup.secret, &headers)?;

    let summary = tokio::time::timeout(
        SWEEP_DEADLINE,
        sweeper::sweep(&state.metadata, &state.storage),
    )
    .await
    .map_err(|_| ApiError::Storage(anyhow::anyhow!("cleanup sweep deadline exceeded")))??;

    counter!(SWEEPS_TOTAL).increment(1);
    counter!(SWEEP_FILES_DELETED_TOTAL).increment(summary.total_files_deleted);

    Ok(Json(summary))
}

/// Check the `Authorization: Bearer <secret>` header.
fn authorize(configured_secret: &str, headers: &HeaderMap) -> Result<(), ApiError> {
    // No secret configured means the endpoint is disabled outright.
    if configured_secret.is_empty() {
        return Err(ApiError::Unauthorized {
            message: "Cleanup endpoint is disabled".to_string(),
        });
    }

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if provided.as_bytes().ct_eq(configured_secret.as_bytes()).into() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized {
            message: "Invalid cleanup credentials".to_string(),
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
