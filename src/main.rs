//! Vanish -- ephemeral file-sharing server.
//!
//! Crash-only design: every startup is a recovery. SIGTERM/SIGINT
//! handlers only stop accepting connections and wait with a timeout
//! before exiting -- any records left half-expired are finished by the
//! next cleanup sweep.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

/// Command-line arguments for the Vanish server.
#[derive(Parser, Debug)]
#[command(name = "vanish", version, about = "Ephemeral file-sharing server")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "vanish.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = vanish::config::load_config(&cli.config)?;

    // Initialize tracing / logging. RUST_LOG overrides the configured level.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    if config.observability.metrics {
        vanish::metrics::init_metrics();
        vanish::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // Initialize metadata store (SQLite).
    let metadata_path = &config.metadata.sqlite.path;
    // Ensure parent directory exists for the SQLite file.
    if let Some(parent) = std::path::Path::new(metadata_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let metadata_store = vanish::metadata::sqlite::SqliteMetadataStore::new(metadata_path)?;
    info!("SQLite metadata store initialized at {}", metadata_path);

    let metadata: Arc<dyn vanish::metadata::store::MetadataStore> = Arc::new(metadata_store);

    // Initialize blob storage backend based on config.
    let storage: Arc<dyn vanish::storage::backend::BlobBackend> =
        match config.storage.backend.as_str() {
            "memory" => {
                let max_size = config
                    .storage
                    .memory
                    .as_ref()
                    .map(|m| m.max_size_bytes)
                    .unwrap_or(0);
                info!("Memory storage backend initialized (max_size_bytes={max_size})");
                Arc::new(vanish::storage::memory::MemoryBackend::new(max_size))
            }
            _ => {
                let storage_root = &config.storage.local.root_dir;
                let local_backend = vanish::storage::local::LocalBackend::new(storage_root)?;
                info!("Local storage backend initialized at {}", storage_root);
                Arc::new(local_backend)
            }
        };

    if config.cleanup.secret.is_empty() {
        info!("No cleanup secret configured; /api/cleanup is disabled");
    }

    let limiter = vanish::ratelimit::RateLimiter::new(
        metadata.clone(),
        config.rate_limits.upload,
        config.rate_limits.view,
    );

    // Build AppState.
    let state = Arc::new(vanish::AppState {
        config: config.clone(),
        metadata,
        storage,
        limiter,
    });

    let app = vanish::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Vanish listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections
    // and wait for in-flight requests up to server.shutdown_timeout.
    let shutdown_timeout = std::time::Duration::from_secs(config.server.shutdown_timeout);
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = drain_tx.send(());
    });

    tokio::select! {
        result = server => result?,
        _ = async {
            let _ = drain_rx.await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "graceful shutdown timed out, exiting"
            );
        }
    }

    info!("Vanish shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
