//! Per-identity, per-action rate limiting.
//!
//! Counters live in the metadata store so every process sharing the
//! store shares the budget; the increment-and-compare is a single
//! conditional update there.  This module owns the action kinds, the
//! configured caps, and client identity derivation.

use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use metrics::counter;

use crate::config::RateLimitRule;
use crate::errors::ApiError;
use crate::metadata::store::{MetadataStore, RateDecision};
use crate::metrics::RATE_LIMITED_TOTAL;

/// Rate-limited action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    View,
}

impl Action {
    /// Storage key component for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Upload => "upload",
            Action::View => "view",
        }
    }

    /// Human-readable plural for limit messages.
    fn plural(&self) -> &'static str {
        match self {
            Action::Upload => "uploads",
            Action::View => "views",
        }
    }
}

/// Enforces configured caps through the shared metadata store.
#[derive(Clone)]
pub struct RateLimiter {
    metadata: Arc<dyn MetadataStore>,
    upload: RateLimitRule,
    view: RateLimitRule,
}

impl RateLimiter {
    pub fn new(metadata: Arc<dyn MetadataStore>, upload: RateLimitRule, view: RateLimitRule) -> Self {
        Self {
            metadata,
            upload,
            view,
        }
    }

    /// Count one `action` for `identity` and reject it if the window's
    /// budget is spent.
    pub async fn check(&self, identity: &str, action: Action) -> Result<(), ApiError> {
        let rule = match action {
            Action::Upload => &self.upload,
            Action::View => &self.view,
        };

        let decision = self
            .metadata
            .check_rate_limit(
                identity,
                action.as_str(),
                rule.limit,
                Duration::seconds(rule.window_secs as i64),
                Utc::now(),
            )
            .await?;

        match decision {
            RateDecision::Allowed => Ok(()),
            RateDecision::Limited => {
                counter!(RATE_LIMITED_TOTAL, "action" => action.as_str()).increment(1);
                Err(ApiError::RateLimited {
                    message: format!(
                        "Rate limit exceeded: max {} {} per {}",
                        rule.limit,
                        action.plural(),
                        format_window(rule.window_secs)
                    ),
                })
            }
        }
    }
}

/// Render a window length for limit messages ("1 hour", "24 hours", "90 seconds").
fn format_window(secs: u64) -> String {
    if secs % 3600 == 0 && secs > 0 {
        let hours = secs / 3600;
        if hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{hours} hours")
        }
    } else {
        format!("{secs} seconds")
    }
}

/// Derive the client identity from request headers.
///
/// Behind a proxy the peer address is the proxy's, so prefer the
/// forwarding headers; the first `x-forwarded-for` entry is the
/// original client.
pub fn client_identity(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    "unknown".to_string()
}

// ── Tests ───────────────────────────────────────────────────────────
