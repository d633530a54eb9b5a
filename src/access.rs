//! Password access gate.
//!
//! A no-op for unencrypted records.  For encrypted records the
//! caller-supplied hash is compared verbatim against the stored one;
//! the server never derives or verifies a real key.  The client
//! encrypts before upload, so this gate only guards the ciphertext.
//!
//! The comparison is ordinary string equality.  Whether it should be
//! constant-time is an open hardening question tracked in DESIGN.md.

use crate::errors::ApiError;
use crate::metadata::store::FileRecord;

/// Check the caller's password hash against the record.
///
/// An empty or missing hash is always a mismatch for encrypted records.
pub fn check(record: &FileRecord, provided_hash: Option<&str>) -> Result<(), ApiError> {
    if !record.is_encrypted {
        return Ok(());
    }

    let stored = record.password_hash.as_deref().unwrap_or("");
    match provided_hash {
        Some(hash) if !hash.is_empty() && hash == stored => Ok(()),
        _ => Err(ApiError::Unauthorized {
            message: "Password required".to_string(),
        }),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
