//! Media cache server
//!
//! Serves the in-memory media cache and the on-disk asset store to local
//! consumers over HTTP.

mod error;
mod server;
mod types;

use crate::error::{Result, ServerError};
use crate::server::{run_server, AppState};
use crate::types::ServerConfig;
use asset_store::AssetStore;
use media_cache::{CacheConfig, HttpTransport, MediaCache, Transport};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("media_cache_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting media cache server...");

    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Max entries: {}", config.cache.max_entries);
    info!(
        "Max cache size: {} MB",
        config.cache.max_total_bytes / (1024 * 1024)
    );
    info!("Entry max age: {} seconds", config.cache.max_age.as_secs());
    info!("Asset dir: {:?}", config.asset_cache_dir);

    let mut http = HttpTransport::with_timeout(Duration::from_secs(config.fetch_timeout_secs));
    if let Some(ref base) = config.base_url {
        http = http.with_base_url(Url::parse(base)?);
    }
    let transport: Arc<dyn Transport> = Arc::new(http);

    let cache = Arc::new(MediaCache::new(config.cache.clone(), transport.clone()));
    cache.start_sweeper();

    let assets = AssetStore::new(
        config.asset_cache_dir,
        &config.asset_path_prefix,
        config.asset_max_size,
        config.asset_ttl_secs,
    );
    assets.init().await?;
    assets.purge_expired().await;

    let state = AppState::new(cache.clone(), assets, transport);

    run_server(state, config.port, shutdown_signal())
        .await
        .map_err(|e| ServerError::Config(format!("Server error: {}", e)))?;

    cache.shutdown().await;
    info!("Media cache server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Read an environment variable, falling back to `default` when unset or unparsable
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn load_config() -> Result<ServerConfig> {
    let defaults = ServerConfig::default();
    let cache_defaults = CacheConfig::default();

    let cache = CacheConfig {
        max_entries: env_or("MEDIA_CACHE_MAX_ENTRIES", cache_defaults.max_entries),
        max_age: Duration::from_secs(env_or(
            "MEDIA_CACHE_MAX_AGE_SECS",
            cache_defaults.max_age.as_secs(),
        )),
        sweep_interval: Duration::from_secs(env_or(
            "MEDIA_CACHE_SWEEP_SECS",
            cache_defaults.sweep_interval.as_secs(),
        )),
        ..cache_defaults
    }
    .with_max_total_mb(env_or("MEDIA_CACHE_MAX_MB", 1000));

    let asset_cache_dir = std::env::var("ASSET_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.asset_cache_dir);

    Ok(ServerConfig {
        port: env_or("PORT", defaults.port),
        base_url: std::env::var("BASE_URL").ok(),
        fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs),
        cache,
        asset_cache_dir,
        asset_path_prefix: std::env::var("ASSET_PATH_PREFIX")
            .unwrap_or(defaults.asset_path_prefix),
        asset_max_size: env_or("ASSET_MAX_SIZE", defaults.asset_max_size),
        asset_ttl_secs: env_or("ASSET_TTL_SECS", defaults.asset_ttl_secs),
    })
}
