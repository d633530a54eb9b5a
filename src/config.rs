//! Configuration loading and types for Vanish.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, CORS, cleanup auth, rate limiting, metadata
//! persistence, and payload storage.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cross-origin settings for the browser frontend.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Cleanup endpoint authentication.
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Per-client rate limit rules.
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    /// Metadata store settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Payload blob storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probe).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Maximum decoded upload size in bytes (default 20 MB).
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Cross-origin settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Origin allowed to call the API ("*" for any).
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
        }
    }
}

/// Cleanup endpoint authentication.
///
/// An empty secret disables the endpoint entirely rather than leaving
/// it open.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CleanupConfig {
    /// Bearer secret required by `POST /api/cleanup`.
    #[serde(default)]
    pub secret: String,
}

/// One cap: at most `limit` actions per rolling `window_secs` window.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_secs: u64,
}

/// Per-client rate limit rules.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitsConfig {
    /// Upload cap (default 5 per 24 hours).
    #[serde(default = "default_upload_rule")]
    pub upload: RateLimitRule,

    /// View cap (default 16 per hour).
    #[serde(default = "default_view_rule")]
    pub view: RateLimitRule,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            upload: default_upload_rule(),
            view: default_view_rule(),
        }
    }
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetadataConfig {
    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

/// SQLite-specific metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_metadata_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Payload blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `local` or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Local storage configuration.
    #[serde(default)]
    pub local: LocalStorageConfig,

    /// Memory storage configuration.
    #[serde(default)]
    pub memory: Option<MemoryStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalStorageConfig::default(),
            memory: None,
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageConfig {
    /// Root directory for stored blobs.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// Memory storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryStorageConfig {
    /// Maximum total size in bytes (0 = unlimited).
    #[serde(default)]
    pub max_size_bytes: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
///
/// Controls Prometheus metrics collection and the `/health` probe.
/// Both are enabled by default.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_upload_size() -> u64 {
    20_971_520 // 20 MB
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

fn default_upload_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 5,
        window_secs: 86_400,
    }
}

fn default_view_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 16,
        window_secs: 3_600,
    }
}

fn default_metadata_path() -> String {
    "./data/metadata.db".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_storage_root() -> String {
    "./data/blobs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.server.max_upload_size, 20_971_520);
        assert_eq!(config.rate_limits.upload.limit, 5);
        assert_eq!(config.rate_limits.upload.window_secs, 86_400);
        assert_eq!(config.rate_limits.view.limit, 16);
        assert_eq!(config.rate_limits.view.window_secs, 3_600);
        assert_eq!(config.storage.backend, "local");
        assert!(config.cleanup.secret.is_empty());
        assert_eq!(config.cors.allowed_origin, "*");
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
server:
  port: 9999
cleanup:
  secret: "swordfish"
rate_limits:
  view:
    limit: 2
    window_secs: 60
storage:
  backend: memory
  memory:
    max_size_bytes: 1048576
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.cleanup.secret, "swordfish");
        assert_eq!(config.rate_limits.view.limit, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.rate_limits.upload.limit, 5);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(
            config.storage.memory.as_ref().map(|m| m.max_size_bytes),
            Some(1_048_576)
        );
    }
}
