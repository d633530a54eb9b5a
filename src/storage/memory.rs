//! In-memory blob backend.
//!
//! Blobs are held in a `tokio::sync::RwLock<HashMap<...>>`.  A
//! configurable memory limit (`max_size_bytes`) caps total stored bytes.
//! Useful for testing and small ephemeral deployments.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::backend::{BlobBackend, StoredBlob};

/// In-memory blob backend.
pub struct MemoryBackend {
    /// Blob store: blob_id -> data.
    blobs: tokio::sync::RwLock<HashMap<String, Bytes>>,
    /// Current total bytes stored.
    current_size: tokio::sync::RwLock<u64>,
    /// Maximum bytes allowed.  0 means unlimited.
    max_size_bytes: u64,
}

impl MemoryBackend {
    /// Create a new `MemoryBackend` with the given capacity (0 = unlimited).
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            blobs: tokio::sync::RwLock::new(HashMap::new()),
            current_size: tokio::sync::RwLock::new(0),
            max_size_bytes,
        }
    }

    /// Compute the SHA-256 content hash for a byte slice.
    fn compute_content_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(0)
    }
}

impl BlobBackend for MemoryBackend {
    fn put(
        &self,
        blob_id: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let blob_id = blob_id.to_string();
        Box::pin(async move {
            let mut blobs = self.blobs.write().await;
            let mut size = self.current_size.write().await;

            let replaced = blobs.get(&blob_id).map(|b| b.len() as u64).unwrap_or(0);
            let new_total = *size - replaced + data.len() as u64;
            if self.max_size_bytes > 0 && new_total > self.max_size_bytes {
                anyhow::bail!(
                    "memory limit exceeded: total={new_total}, max={}",
                    self.max_size_bytes
                );
            }

            blobs.insert(blob_id, data);
            *size = new_total;
            Ok(())
        })
    }

    fn get(
        &self,
        blob_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<StoredBlob>> + Send + '_>> {
        let blob_id = blob_id.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            match blobs.get(&blob_id) {
                Some(data) => Ok(StoredBlob {
                    data: data.clone(),
                    content_hash: Self::compute_content_hash(data),
                }),
                None => Err(anyhow::anyhow!("blob not found: {}", blob_id)),
            }
        })
    }

    fn delete(
        &self,
        blob_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let blob_id = blob_id.to_string();
        Box::pin(async move {
            let mut blobs = self.blobs.write().await;
            if let Some(data) = blobs.remove(&blob_id) {
                let mut size = self.current_size.write().await;
                *size -= data.len() as u64;
            }
            Ok(())
        })
    }

    fn exists(
        &self,
        blob_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let blob_id = blob_id.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            Ok(blobs.contains_key(&blob_id))
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
