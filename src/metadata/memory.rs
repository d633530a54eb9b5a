//! In-memory metadata store.
//!
//! Stores all records in memory with no persistence. Useful for testing
//! and ephemeral deployments. A single `Mutex<Inner>` guards both the
//! file map and the rate-limit counters, so every operation that must be
//! atomic (view increment, rate-limit upsert, bulk promotion) runs under
//! one critical section.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use super::store::{
    FileRecord, FileStatus, MetadataStore, RateDecision, ViewOutcome,
};

/// (identity, action) rate-limit key.
type RateKey = (String, String);

#[derive(Debug, Clone)]
struct RateCounter {
    count: u32,
    window_started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<String, FileRecord>,
    rate_limits: HashMap<RateKey, RateCounter>,
}

/// Metadata store holding everything in process memory.
pub struct MemoryMetadataStore {
    inner: Mutex<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn create_record(
        &self,
        record: FileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("mutex poisoned");
            if inner.files.contains_key(&record.token) {
                return Err(anyhow::anyhow!("token already exists: {}", record.token));
            }
            inner.files.insert(record.token.clone(), record);
            Ok(())
        })
    }

    fn get_by_token(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        let token = token.to_string();
        Box::pin(async move {
            let inner = self.inner.lock().expect("mutex poisoned");
            Ok(inner.files.get(&token).cloned())
        })
    }

    fn record_view_and_maybe_expire(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ViewOutcome>> + Send + '_>> {
        let token = token.to_string();
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("mutex poisoned");
            let record = match inner.files.get_mut(&token) {
                Some(r) => r,
                None => return Ok(ViewOutcome::NotFound),
            };

            // Same refusal condition as the SQLite conditional update.
            let budget_left = match record.max_views {
                Some(max) => record.current_views < max,
                None => true,
            };
            if record.status != FileStatus::Active || !budget_left {
                return Ok(ViewOutcome::Exhausted);
            }

            record.current_views += 1;
            if let Some(max) = record.max_views {
                if record.current_views >= max {
                    record.status = FileStatus::Expired;
                }
            }
            Ok(ViewOutcome::Recorded(record.clone()))
        })
    }

    fn mark_expired(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let token = token.to_string();
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("mutex poisoned");
            if let Some(record) = inner.files.get_mut(&token) {
                record.status = FileStatus::Expired;
            }
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
            let inner = self.inner.lock().expect("mutex poisoned");
            let mut matching: Vec<&FileRecord> = inner
                .files
                .values()
                .filter(|r| r.status == status)
                .collect();
            // Stable order so paging does not skip or repeat records.
            matching.sort_by(|a, b| a.token.cmp(&b.token));
            Ok(matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect())
        })
    }

    fn promote_stale_active(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("mutex poisoned");
            let mut promoted = 0u64;
            for record in inner.files.values_mut() {
                if record.status != FileStatus::Active {
                    continue;
                }
                let timed_out = record.expires_at < now;
                let spent = record
                    .max_views
                    .is_some_and(|max| record.current_views >= max);
                if timed_out || spent {
                    record.status = FileStatus::Expired;
                    promoted += 1;
                }
            }
            Ok(promoted)
        })
    }

    fn delete_by_status(
        &self,
        status: FileStatus,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("mutex poisoned");
            let before = inner.files.len();
            inner.files.retain(|_, r| r.status != status);
            Ok((before - inner.files.len()) as u64)
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
        let key = (identity.to_string(), action.to_string());
        Box::pin(async move {
            let mut inner = self.inner.lock().expect("mutex poisoned");
            let counter = inner.rate_limits.entry(key).or_insert(RateCounter {
                count: 0,
                window_started_at: now,
            });

            // Lazy window reset.
            if now - counter.window_started_at >= window {
                counter.count = 0;
                counter.window_started_at = now;
            }

            if counter.count >= limit {
                return Ok(RateDecision::Limited);
            }
            counter.count += 1;
            Ok(RateDecision::Allowed)
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
