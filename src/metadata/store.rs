//! Abstract metadata store trait.
//!
//! Any metadata backend must implement [`MetadataStore`].  The trait
//! uses `async_trait`-style methods (manual desugaring with pinned
//! futures) so it can be used with both SQLite and in-memory stores.
//!
//! The store is the only component that mutates persisted file records.
//! Every cross-request invariant (view-count ceiling, rate-limit ceiling,
//! status monotonicity) is enforced here through conditional updates,
//! never through read-then-write pairs.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::pin::Pin;

// ── Record types ───────────────────────────────────────────────────

/// Lifecycle status of a file record.
///
/// `Expired` is terminal: no transition back to `Active` exists anywhere
/// in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// The record may still be served (subject to expiry evaluation).
    Active,
    /// The record is permanently inaccessible and awaits sweeping.
    Expired,
}

impl FileStatus {
    /// Storage representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Expired => "expired",
        }
    }

    /// Parse a stored status string.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "active" => Ok(FileStatus::Active),
            "expired" => Ok(FileStatus::Expired),
            other => Err(anyhow::anyhow!("unknown file status: {other}")),
        }
    }
}

/// Where a record's payload bytes live.
///
/// Exactly one variant is populated per record and the choice is
/// permanent for the record's lifetime.  Small payloads are embedded in
/// the metadata row; large ones live in the blob backend under a
/// generated id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLocation {
    /// Payload bytes embedded directly in the metadata record.
    Inline(Bytes),
    /// Reference id into the blob backend.
    Blob(String),
}

impl PayloadLocation {
    /// Whether this record's bytes live in the blob backend.
    pub fn is_blob(&self) -> bool {
        matches!(self, PayloadLocation::Blob(_))
    }
}

/// Metadata record for one shared file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Opaque caller-facing identifier, generated at creation.
    pub token: String,
    /// Caller-supplied display filename.
    pub filename: String,
    /// MIME type, constrained to the upload allow-list.
    pub content_type: String,
    /// Inline bytes or blob backend reference.
    pub payload: PayloadLocation,
    /// Informational flag, passed through unchanged.
    pub allow_downloads: bool,
    /// Informational flag, passed through unchanged.
    pub allow_copying: bool,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
    /// Absolute deadline; defaults to creation time + 72h.
    pub expires_at: DateTime<Utc>,
    /// View ceiling. `None` means unlimited; the default of 1 is applied
    /// at the upload boundary, not here.
    pub max_views: Option<u32>,
    /// Monotonically increasing counter, mutated only by
    /// [`MetadataStore::record_view_and_maybe_expire`].
    pub current_views: u32,
    /// Lifecycle status.
    pub status: FileStatus,
    /// Stored password hash, compared verbatim by the access gate.
    pub password_hash: Option<String>,
    /// When false the access gate is a no-op.
    pub is_encrypted: bool,
}

// ── Operation results ──────────────────────────────────────────────

/// Result of the atomic view-increment operation.
#[derive(Debug, Clone)]
pub enum ViewOutcome {
    /// The view was counted; the record reflects the post-increment state.
    Recorded(FileRecord),
    /// The record exists but its view budget is spent (or it is already
    /// expired).  The caller must treat the record as gone.
    Exhausted,
    /// No record with that token exists.
    NotFound,
}

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request is within the window's budget and has been counted.
    Allowed,
    /// The identity has exhausted its budget for this window.
    Limited,
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
///
/// Implementors must express `record_view_and_maybe_expire`,
/// `promote_stale_active`, and `check_rate_limit` as single conditional
/// updates against their backing store: a naive read-modify-write loses
/// updates under concurrent callers.
pub trait MetadataStore: Send + Sync + 'static {
    /// Persist a new file record.  The token is generated by the caller
    /// from a sufficiently random source, so no uniqueness race exists.
    fn create_record(
        &self,
        record: FileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Look up a record by token.
    fn get_by_token(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>>;

    /// Atomically count one view and, if the increment crosses
    /// `max_views`, flip the record to `Expired` in the same step.
    ///
    /// Under N concurrent calls against a record with `max_views = M`,
    /// exactly `min(N, M)` calls observe [`ViewOutcome::Recorded`] and
    /// `current_views` settles at that value.
    fn record_view_and_maybe_expire(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ViewOutcome>> + Send + '_>>;

    /// Idempotent explicit Active -> Expired transition, used when the
    /// expiry policy detects time-based expiry on the read path.
    fn mark_expired(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Page through records with the given status.  Used by the sweeper.
    fn scan_by_status(
        &self,
        status: FileStatus,
        limit: u32,
        offset: u64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<FileRecord>>> + Send + '_>>;

    /// Bulk conditional update flipping Active -> Expired for any record
    /// whose deadline has passed or whose view budget is spent.  Returns
    /// the number of promoted records.
    fn promote_stale_active(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;

    /// Delete all records with the given status.  Returns the number of
    /// deleted metadata rows.
    fn delete_by_status(
        &self,
        status: FileStatus,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>>;

    /// Atomically count one action for `identity` and compare against
    /// `limit` within a fixed `window`.  The window resets lazily: the
    /// first request after the window has elapsed starts a fresh count.
    fn check_rate_limit(
        &self,
        identity: &str,
        action: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RateDecision>> + Send + '_>>;
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(FileStatus::parse("active").unwrap(), FileStatus::Active);
        assert_eq!(FileStatus::parse("expired").unwrap(), FileStatus::Expired);
        assert_eq!(FileStatus::Active.as_str(), "active");
        assert_eq!(FileStatus::Expired.as_str(), "expired");
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!(FileStatus::parse("ACTIVE").is_err());
        assert!(FileStatus::parse("").is_err());
        assert!(FileStatus::parse("deleted").is_err());
    }

    #[test]
    fn test_payload_location_is_blob() {
        assert!(PayloadLocation::Blob("abc".to_string()).is_blob());
        assert!(!PayloadLocation::Inline(Bytes::from_static(b"x")).is_blob());
    }
}
