//! Local filesystem blob backend.
//!
//! Blobs are stored as flat files under a configurable root directory,
//! named by their generated id.
//!
//! All writes follow the temp-fsync-rename pattern so a crash mid-write
//! never leaves a partial blob at its final path.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;

use super::backend::{BlobBackend, StoredBlob};

/// Stores blobs on the local filesystem.
pub struct LocalBackend {
    /// Root directory for all stored blobs.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        // Also create the .tmp directory for atomic writes.
        std::fs::create_dir_all(root.join(".tmp"))?;
        Ok(Self { root })
    }

    /// Resolve a blob id to an absolute file path.
    ///
    /// Blob ids are generated UUIDs, but reject path separators and
    /// parent components anyway so a corrupted id cannot escape the root.
    fn resolve(&self, blob_id: &str) -> anyhow::Result<PathBuf> {
        if blob_id.is_empty() {
            anyhow::bail!("empty blob id");
        }
        for component in std::path::Path::new(blob_id).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => anyhow::bail!("invalid blob id: {}", blob_id),
            }
        }
        if blob_id.contains('/') || blob_id.contains('\\') {
            anyhow::bail!("invalid blob id: {}", blob_id);
        }
        Ok(self.root.join(blob_id))
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(".tmp").join(format!("tmp-{}", id))
    }
}

impl BlobBackend for LocalBackend {
    fn put(
        &self,
        blob_id: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let blob_id = blob_id.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&blob_id)?;

            // Temp-fsync-rename.
            let tmp_path = self.temp_path();
            if let Some(parent) = tmp_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;

            std::fs::rename(&tmp_path, &final_path)?;
            Ok(())
        })
    }

    fn get(
        &self,
        blob_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<StoredBlob>> + Send + '_>> {
        let blob_id = blob_id.to_string();
        Box::pin(async move {
            let path = self.resolve(&blob_id)?;

            if !path.exists() {
                anyhow::bail!("blob not found: {}", blob_id);
            }

            let data = Bytes::from(std::fs::read(&path)?);

            let mut hasher = Sha256::new();
            hasher.update(&data);
            let content_hash = hex::encode(hasher.finalize());

            Ok(StoredBlob { data, content_hash })
        })
    }

    fn delete(
        &self,
        blob_id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let blob_id = blob_id.to_string();
        Box::pin(async move {
            let path = self.resolve(&blob_id)?;

            // Idempotent: if the file doesn't exist, that's fine.
            if path.exists() {
                std::fs::remove_file(&path)?;
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
            let path = self.resolve(&blob_id)?;
            Ok(path.exists() && path.is_file())
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
