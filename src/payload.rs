//! Storage selector.
//!
//! Decides where a payload's bytes live by size alone: below the 1.5 MB
//! threshold they are embedded inline in the metadata record, at or
//! above it they are written to the blob backend under a generated id.
//! Fetch and purge route by whichever locator variant is populated, so
//! callers see one contract for both paths.
//!
//! The size check happens once, at creation time, against the decoded
//! payload length, never the encoded transport size.

use bytes::Bytes;
use uuid::Uuid;

use crate::metadata::store::{FileRecord, PayloadLocation};
use crate::storage::backend::BlobBackend;

/// Payloads of at most this many decoded bytes are stored inline (1.5 MB).
pub const INLINE_THRESHOLD: usize = 3 * 1024 * 1024 / 2;

/// Place `data`, returning the locator to persist on the record.
///
/// Blob writes happen before the metadata insert; if the insert later
/// fails the blob is orphaned and reclaimed only out of band.
pub async fn store_payload(
    storage: &dyn BlobBackend,
    data: Bytes,
) -> anyhow::Result<PayloadLocation> {
    if data.len() <= INLINE_THRESHOLD {
        return Ok(PayloadLocation::Inline(data));
    }

    let blob_id = Uuid::new_v4().to_string();
    storage.put(&blob_id, data).await?;
    Ok(PayloadLocation::Blob(blob_id))
}

/// Retrieve a record's payload bytes from whichever backend holds them.
pub async fn fetch_payload(
    storage: &dyn BlobBackend,
    record: &FileRecord,
) -> anyhow::Result<Bytes> {
    match &record.payload {
        PayloadLocation::Inline(data) => Ok(data.clone()),
        PayloadLocation::Blob(blob_id) => Ok(storage.get(blob_id).await?.data),
    }
}

/// Remove a record's bytes from the blob backend if it has any.
///
/// Inline records need no separate purge (deleting the metadata row is
/// enough); returns `true` only when a blob delete was issued.
pub async fn purge_payload(
    storage: &dyn BlobBackend,
    record: &FileRecord,
) -> anyhow::Result<bool> {
    match &record.payload {
        PayloadLocation::Inline(_) => Ok(false),
        PayloadLocation::Blob(blob_id) => {
            storage.delete(blob_id).await?;
            Ok(true)
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
