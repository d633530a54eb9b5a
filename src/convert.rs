//! Notebook-to-HTML conversion.
//!
//! Jupyter notebooks are stored as their original JSON but served as
//! rendered HTML when possible.  Rendering shells out to `jupyter
//! nbconvert` with the notebook staged in a temp directory; the child
//! runs under a hard timeout so a hung converter cannot stall a view.
//! Any failure here is non-fatal: the caller falls back to the raw
//! notebook bytes.

use std::time::Duration;

use bytes::Bytes;
use tokio::process::Command;
use tracing::debug;

use crate::errors::ApiError;

/// Content type of uploaded Jupyter notebooks.
pub const NOTEBOOK_CONTENT_TYPE: &str = "application/x-ipynb+json";

const CONVERT_TIMEOUT: Duration = Duration::from_secs(20);

/// A successfully converted payload.
pub struct Converted {
    pub data: Bytes,
    pub content_type: String,
    pub filename: String,
}

/// Render a notebook to a standalone HTML document.
pub async fn notebook_to_html(data: &[u8], filename: &str) -> Result<Converted, ApiError> {
    let dir = tempfile::tempdir().map_err(|err| {
        debug!(error = %err, "failed to create conversion workspace");
        ApiError::Conversion
    })?;
    let input = dir.path().join("input.ipynb");
    tokio::fs::write(&input, data).await.map_err(|err| {
        debug!(error = %err, "failed to stage notebook for conversion");
        ApiError::Conversion
    })?;

    let run = Command::new("jupyter")
        .arg("nbconvert")
        .arg("--to")
        .arg("html")
        .arg("--stdout")
        .arg(&input)
        .output();

    let output = match tokio::time::timeout(CONVERT_TIMEOUT, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            debug!(error = %err, "failed to spawn nbconvert");
            return Err(ApiError::Conversion);
        }
        Err(_) => {
            debug!(timeout_secs = CONVERT_TIMEOUT.as_secs(), "nbconvert timed out");
            return Err(ApiError::Conversion);
        }
    };

    if !output.status.success() || output.stdout.is_empty() {
        debug!(
            status = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "nbconvert failed"
        );
        return Err(ApiError::Conversion);
    }

    Ok(Converted {
        data: Bytes::from(output.stdout),
        content_type: "text/html".to_string(),
        filename: html_filename(filename),
    })
}

/// Swap a filename's extension for `.html`.
fn html_filename(filename: &str) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    format!("{stem}.html")
}

// ── Tests ───────────────────────────────────────────────────────────
