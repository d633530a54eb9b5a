//! SQLite-backed metadata store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.
//!
//! The view-increment and rate-limit operations are single conditional
//! statements so their semantics hold even when the store is shared by
//! multiple processes (the mutex only serializes this process).

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::store::{
    FileRecord, FileStatus, MetadataStore, PayloadLocation, RateDecision, ViewOutcome,
};

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

/// Metadata store backed by a single SQLite database file.
pub struct SqliteMetadataStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables and indexes if they do not already exist.
    /// Idempotent, safe to call on every startup.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );

            -- File records. Exactly one of inline_data / blob_id is set.
            CREATE TABLE IF NOT EXISTS files (
                token           TEXT PRIMARY KEY,
                filename        TEXT NOT NULL,
                content_type    TEXT NOT NULL,
                inline_data     BLOB,
                blob_id         TEXT,
                allow_downloads INTEGER NOT NULL DEFAULT 0,
                allow_copying   INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                expires_at      INTEGER NOT NULL,
                max_views       INTEGER,
                current_views   INTEGER NOT NULL DEFAULT 0,
                status          TEXT NOT NULL DEFAULT 'active',
                password_hash   TEXT,
                is_encrypted    INTEGER NOT NULL DEFAULT 0,

                CHECK ((inline_data IS NULL) <> (blob_id IS NULL)),
                CHECK (status IN ('active', 'expired'))
            );

            CREATE INDEX IF NOT EXISTS idx_files_status
                ON files(status);
            CREATE INDEX IF NOT EXISTS idx_files_expires_at
                ON files(expires_at);

            -- Rolling-window rate-limit counters.
            CREATE TABLE IF NOT EXISTS rate_limits (
                identity          TEXT NOT NULL,
                action            TEXT NOT NULL,
                count             INTEGER NOT NULL,
                window_started_at INTEGER NOT NULL,

                PRIMARY KEY (identity, action)
            );
            ",
        )?;

        // Record schema version if not already present.
        let existing: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        if existing.is_none() || existing.unwrap() < SCHEMA_VERSION {
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, Utc::now().timestamp_millis()],
            )?;
        }

        Ok(())
    }
}

/// Map a `files` row to a [`FileRecord`].
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let inline: Option<Vec<u8>> = row.get("inline_data")?;
    let blob_id: Option<String> = row.get("blob_id")?;
    let payload = match (inline, blob_id) {
        (Some(data), _) => PayloadLocation::Inline(Bytes::from(data)),
        (None, Some(id)) => PayloadLocation::Blob(id),
        (None, None) => {
            // Unreachable given the table CHECK constraint.
            return Err(rusqlite::Error::InvalidQuery);
        }
    };

    let status_str: String = row.get("status")?;
    let status = FileStatus::parse(&status_str).map_err(|_| rusqlite::Error::InvalidQuery)?;

    Ok(FileRecord {
        token: row.get("token")?,
        filename: row.get("filename")?,
        content_type: row.get("content_type")?,
        payload,
        allow_downloads: row.get("allow_downloads")?,
        allow_copying: row.get("allow_copying")?,
        created_at: millis_to_datetime(row.get("created_at")?),
        expires_at: millis_to_datetime(row.get("expires_at")?),
        max_views: row.get::<_, Option<u32>>("max_views")?,
        current_views: row.get("current_views")?,
        status,
        password_hash: row.get("password_hash")?,
        is_encrypted: row.get("is_encrypted")?,
    })
}

/// Convert stored unix milliseconds to a UTC timestamp.
fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

const SELECT_COLUMNS: &str = "token, filename, content_type, inline_data, blob_id, \
     allow_downloads, allow_copying, created_at, expires_at, \
     max_views, current_views, status, password_hash, is_encrypted";

// ── MetadataStore implementation ───────────────────────────────────

impl MetadataStore for SqliteMetadataStore {
    fn create_record(
        &self,
        record: FileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let (inline_data, blob_id): (Option<&[u8]>, Option<&str>) = match &record.payload {
                PayloadLocation::Inline(data) => (Some(data.as_ref()), None),
                PayloadLocation::Blob(id) => (None, Some(id.as_str())),
            };

            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO files (token, filename, content_type, inline_data, blob_id,
                                    allow_downloads, allow_copying, created_at, expires_at,
                                    max_views, current_views, status, password_hash, is_encrypted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.token,
                    record.filename,
                    record.content_type,
                    inline_data,
                    blob_id,
                    record.allow_downloads,
                    record.allow_copying,
                    record.created_at.timestamp_millis(),
                    record.expires_at.timestamp_millis(),
                    record.max_views,
                    record.current_views,
                    record.status.as_str(),
                    record.password_hash,
                    record.is_encrypted,
                ],
            )?;
            Ok(())
        })
    }

    fn get_by_token(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        let token = token.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let record = conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM files WHERE token = ?1"),
                    params![token],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
    }

    fn record_view_and_maybe_expire(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ViewOutcome>> + Send + '_>> {
        let token = token.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");

            // The increment and the maybe-expire flip happen in one
            // conditional statement. The WHERE clause refuses the
            // increment once the budget is spent, so the observable
            // successful-view count never exceeds max_views.
            let affected = conn.execute(
                "UPDATE files SET
                     current_views = current_views + 1,
                     status = CASE
                         WHEN max_views IS NOT NULL AND current_views + 1 >= max_views
                             THEN 'expired'
                         ELSE status
                     END
                 WHERE token = ?1
                   AND status = 'active'
                   AND (max_views IS NULL OR current_views < max_views)",
                params![token],
            )?;

            if affected == 1 {
                let record = conn
                    .query_row(
                        &format!("SELECT {SELECT_COLUMNS} FROM files WHERE token = ?1"),
                        params![token],
                        row_to_record,
                    )
                    .optional()?;
                return match record {
                    Some(r) => Ok(ViewOutcome::Recorded(r)),
                    // Deleted between the update and the select; the view
                    // was still counted against a then-extant record.
                    None => Ok(ViewOutcome::NotFound),
                };
            }

            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM files WHERE token = ?1)",
                params![token],
                |row| row.get(0),
            )?;
            if exists {
                Ok(ViewOutcome::Exhausted)
            } else {
                Ok(ViewOutcome::NotFound)
            }
        })
    }

    fn mark_expired(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let token = token.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "UPDATE files SET status = 'expired' WHERE token = ?1 AND status = 'active'",
                params![token],
            )?;
            Ok(())
        })
    }

    fn scan_by_status(
        &self,
        status: FileStatus,
        limit: u32,
        offset: u64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM files
                 WHERE status = ?1
                 ORDER BY token
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let records = stmt
                .query_map(
                    params![status.as_str(), limit, offset as i64],
                    row_to_record,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    fn promote_stale_active(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            // Single bulk conditional update: no fetch-then-update loop,
            // so concurrent viewers cannot race a stale read.
            let affected = conn.execute(
                "UPDATE files SET status = 'expired'
                 WHERE status = 'active'
                   AND (expires_at < ?1
                        OR (max_views IS NOT NULL AND current_views >= max_views))",
                params![now.timestamp_millis()],
            )?;
            Ok(affected as u64)
        })
    }

    fn delete_by_status(
        &self,
        status: FileStatus,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let affected = conn.execute(
                "DELETE FROM files WHERE status = ?1",
                params![status.as_str()],
            )?;
            Ok(affected as u64)
        })
    }

    fn check_rate_limit(
        &self,
        identity: &str,
        action: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RateDecision>> + Send + '_>> {
        let identity = identity.to_string();
        let action = action.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");

            // Increment-and-compare as a single conditional upsert.
            // A fresh identity inserts with count 1; an elapsed window
            // resets to 1; otherwise the increment only happens while
            // the count is below the limit. Zero affected rows means
            // the budget is spent.
            let affected = conn.execute(
                "INSERT INTO rate_limits (identity, action, count, window_started_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(identity, action) DO UPDATE SET
                     count = CASE
                         WHEN ?3 - rate_limits.window_started_at >= ?4 THEN 1
                         ELSE rate_limits.count + 1
                     END,
                     window_started_at = CASE
                         WHEN ?3 - rate_limits.window_started_at >= ?4 THEN ?3
                         ELSE rate_limits.window_started_at
                     END
                 WHERE ?3 - rate_limits.window_started_at >= ?4
                    OR rate_limits.count < ?5",
                params![
                    identity,
                    action,
                    now.timestamp_millis(),
                    window.num_milliseconds(),
                    limit,
                ],
            )?;

            if affected == 1 {
                Ok(RateDecision::Allowed)
            } else {
                Ok(RateDecision::Limited)
            }
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
