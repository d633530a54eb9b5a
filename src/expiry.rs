//! Expiry policy.
//!
//! A pure decision function with no side effects: the read path calls
//! [`evaluate`] and, for any expired outcome on a record still marked
//! Active, lazily flips the record via `mark_expired` (self-healing) so
//! a record is never served once any expiry condition holds, even if
//! the periodic sweep has not yet run.

use chrono::{DateTime, Utc};

use crate::metadata::store::{FileRecord, FileStatus};

/// Outcome of evaluating a record against the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The record may be served.
    Active,
    /// The deadline has passed.
    ExpiredByTime,
    /// The view budget is spent.
    ExpiredByViewLimit,
    /// The record was already marked Expired.
    AlreadyExpired,
}

impl Disposition {
    /// Whether this outcome denies access.
    pub fn is_expired(&self) -> bool {
        !matches!(self, Disposition::Active)
    }
}

/// Evaluate a record's lifecycle state at `now`.
///
/// Ordering matters: an already-Expired status short-circuits, then the
/// time deadline, then the view limit.
pub fn evaluate(record: &FileRecord, now: DateTime<Utc>) -> Disposition {
    if record.status == FileStatus::Expired {
        return Disposition::AlreadyExpired;
    }
    if now > record.expires_at {
        return Disposition::ExpiredByTime;
    }
    if let Some(max) = record.max_views {
        if record.current_views >= max {
            return Disposition::ExpiredByViewLimit;
        }
    }
    Disposition::Active
}

// ── Tests ───────────────────────────────────────────────────────────
