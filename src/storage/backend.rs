//! Abstract blob backend trait.
//!
//! Payloads above the inline threshold are stored here, addressed by a
//! generated id.  The trait works in terms of opaque byte buffers so
//! callers do not need to know the underlying medium.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// A stored blob's data plus its content hash.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Raw bytes of the blob.
    pub data: Bytes,
    /// Hex-encoded SHA-256 content hash.
    pub content_hash: String,
}

/// Async blob storage contract.
pub trait BlobBackend: Send + Sync + 'static {
    /// Write `data` under `blob_id`.
    fn put(
        &self,
        blob_id: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Read the full blob stored under `blob_id`.
    fn get(
        &self,
        blob_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<StoredBlob>> + Send + '_>>;

    /// Delete the blob under `blob_id`.  Idempotent: deleting a missing
    /// blob succeeds.
    fn delete(
        &self,
        blob_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Check whether a blob exists under `blob_id`.
    fn exists(
        &self,
        blob_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;
}
