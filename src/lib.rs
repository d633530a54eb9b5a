//! Vanish library — ephemeral file-sharing engine.
//!
//! This crate provides the core components for running an ephemeral
//! file-sharing server: files live behind opaque tokens and become
//! permanently inaccessible once a time limit or view budget is spent.
//! It includes request handling, rate limiting, metadata management,
//! pluggable blob storage backends, and the cleanup sweeper.

use std::sync::Arc;

pub mod access;
pub mod config;
pub mod convert;
pub mod errors;
pub mod expiry;
pub mod handlers;
pub mod metadata;
pub mod metrics;
pub mod payload;
pub mod ratelimit;
pub mod server;
pub mod storage;
pub mod sweeper;

use crate::config::Config;
use crate::metadata::store::MetadataStore;
use crate::ratelimit::RateLimiter;
use crate::storage::backend::BlobBackend;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Metadata store (records and rate-limit counters).
    pub metadata: Arc<dyn MetadataStore>,
    /// Blob storage backend for above-threshold payloads.
    pub storage: Arc<dyn BlobBackend>,
    /// Per-client rate limiter.
    pub limiter: RateLimiter,
}
