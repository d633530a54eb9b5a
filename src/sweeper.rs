//! Cleanup sweeper.
//!
//! Batch purge of expired records: walk the Expired set page by page
//! releasing blob bytes, drop the metadata rows in one statement, then
//! promote any Active records whose deadline has passed.  Promotion
//! runs last, so rows it flips are purged by the *next* sweep, not this
//! one.  Every step tolerates partial prior completion, so a sweep that
//! died halfway is finished by the next run and a second sweep over a
//! clean store deletes nothing.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::metadata::store::{FileStatus, MetadataStore};
use crate::payload;
use crate::storage::backend::BlobBackend;

const SCAN_PAGE_SIZE: u32 = 256;

/// Counters reported after a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub success: bool,
    pub timestamp: String,
    /// Expired records whose bytes lived in the blob backend.
    pub blob_files_deleted: u64,
    /// Expired records whose bytes were inline in the metadata row.
    pub inline_files_deleted: u64,
    /// Metadata rows removed.
    pub metadata_deleted: u64,
    /// Active records flipped to Expired because their deadline passed;
    /// these are purged by the next sweep.
    pub records_promoted: u64,
    pub total_files_deleted: u64,
    pub message: String,
}

/// Run one full sweep over the store.
///
/// Blob delete failures are logged and skipped rather than aborting the
/// sweep; the metadata row is still removed so the record stays
/// inaccessible, and the orphaned blob is reclaimed out of band.
pub async fn sweep(
    metadata: &Arc<dyn MetadataStore>,
    storage: &Arc<dyn BlobBackend>,
) -> anyhow::Result<SweepSummary> {
    let started = Utc::now();

    let mut blob_files_deleted: u64 = 0;
    let mut inline_files_deleted: u64 = 0;
    let mut offset: u64 = 0;
    loop {
        let page = metadata
            .scan_by_status(FileStatus::Expired, SCAN_PAGE_SIZE, offset)
            .await?;
        if page.is_empty() {
            break;
        }
        let page_len = page.len() as u64;
        for record in &page {
            if record.payload.is_blob() {
                match payload::purge_payload(storage.as_ref(), record).await {
                    Ok(_) => blob_files_deleted += 1,
                    Err(err) => {
                        warn!(token = %record.token, error = %err, "failed to delete blob, skipping");
                    }
                }
            } else {
                inline_files_deleted += 1;
            }
        }
        if page_len < SCAN_PAGE_SIZE as u64 {
            break;
        }
        offset += page_len;
    }

    let metadata_deleted = metadata.delete_by_status(FileStatus::Expired).await?;
    let records_promoted = metadata.promote_stale_active(started).await?;
    let total_files_deleted = blob_files_deleted + inline_files_deleted;

    info!(
        records_promoted,
        blob_files_deleted, inline_files_deleted, metadata_deleted, "cleanup sweep finished"
    );

    Ok(SweepSummary {
        success: true,
        timestamp: started.to_rfc3339(),
        blob_files_deleted,
        inline_files_deleted,
        metadata_deleted,
        records_promoted,
        total_files_deleted,
        message: format!(
            "Deleted {total_files_deleted} expired files ({metadata_deleted} metadata records)"
        ),
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::metadata::store::{FileRecord, PayloadLocation};
    use crate::storage::memory::MemoryBackend;
    use bytes::Bytes;
    use chrono::Duration;

    fn make_record(token: &str, status: FileStatus, payload: PayloadLocation) -> FileRecord {
        let now = Utc::now();
        FileRecord {
            token: token.to_string(),
            filename: format!("{token}.bin"),
            content_type: "application/pdf".to_string(),
            payload,
            allow_downloads: true,
            allow_copying: true,
            created_at: now,
            expires_at: now + Duration::hours(72),
            max_views: Some(1),
            current_views: 0,
            status,
            password_hash: None,
            is_encrypted: false,
        }
    }

    #[tokio::test]
    async fn test_sweep_purges_expired_only() {
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let storage: Arc<dyn BlobBackend> = Arc::new(MemoryBackend::new(0));

        storage
            .put("blob-1", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        metadata
            .create_record(make_record(
                "gone-blob",
                FileStatus::Expired,
                PayloadLocation::Blob("blob-1".to_string()),
            ))
            .await
            .unwrap();
        metadata
            .create_record(make_record(
                "gone-inline",
                FileStatus::Expired,
                PayloadLocation::Inline(Bytes::from_static(b"x")),
            ))
            .await
            .unwrap();
        metadata
            .create_record(make_record(
                "alive",
                FileStatus::Active,
                PayloadLocation::Inline(Bytes::from_static(b"y")),
            ))
            .await
            .unwrap();

        let summary = sweep(&metadata, &storage).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.blob_files_deleted, 1);
        assert_eq!(summary.inline_files_deleted, 1);
        assert_eq!(summary.metadata_deleted, 2);
        assert_eq!(summary.total_files_deleted, 2);

        assert!(!storage.exists("blob-1").await.unwrap());
        assert!(metadata.get_by_token("gone-blob").await.unwrap().is_none());
        assert!(metadata.get_by_token("alive").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_promoted_records_are_purged_by_the_next_sweep() {
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let storage: Arc<dyn BlobBackend> = Arc::new(MemoryBackend::new(0));

        let mut stale = make_record(
            "stale",
            FileStatus::Active,
            PayloadLocation::Inline(Bytes::from_static(b"x")),
        );
        stale.expires_at = Utc::now() - Duration::hours(1);
        metadata.create_record(stale).await.unwrap();

        // Promotion runs after deletion, so this sweep only flips the
        // record to Expired.
        let first = sweep(&metadata, &storage).await.unwrap();
        assert_eq!(first.records_promoted, 1);
        assert_eq!(first.metadata_deleted, 0);
        assert_eq!(
            metadata.get_by_token("stale").await.unwrap().unwrap().status,
            FileStatus::Expired
        );

        let second = sweep(&metadata, &storage).await.unwrap();
        assert_eq!(second.records_promoted, 0);
        assert_eq!(second.metadata_deleted, 1);
        assert!(metadata.get_by_token("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let storage: Arc<dyn BlobBackend> = Arc::new(MemoryBackend::new(0));

        metadata
            .create_record(make_record(
                "gone",
                FileStatus::Expired,
                PayloadLocation::Inline(Bytes::from_static(b"x")),
            ))
            .await
            .unwrap();

        let first = sweep(&metadata, &storage).await.unwrap();
        assert_eq!(first.metadata_deleted, 1);

        let second = sweep(&metadata, &storage).await.unwrap();
        assert_eq!(second.metadata_deleted, 0);
        assert_eq!(second.total_files_deleted, 0);
        assert_eq!(second.records_promoted, 0);
    }

    #[tokio::test]
    async fn test_missing_blob_does_not_abort_sweep() {
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let storage: Arc<dyn BlobBackend> = Arc::new(MemoryBackend::new(0));

        // Blob id points at nothing; delete is idempotent so the sweep
        // still counts and removes the record.
        metadata
            .create_record(make_record(
                "dangling",
                FileStatus::Expired,
                PayloadLocation::Blob("never-written".to_string()),
            ))
            .await
            .unwrap();

        let summary = sweep(&metadata, &storage).await.unwrap();
        assert_eq!(summary.metadata_deleted, 1);
        assert!(metadata.get_by_token("dangling").await.unwrap().is_none());
    }
}
