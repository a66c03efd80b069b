//! Configuration and wire types for the media cache server

use asset_store::AssetStats;
use media_cache::{CacheConfig, CacheStats};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Base for resolving relative media URLs
    pub base_url: Option<String>,
    pub fetch_timeout_secs: u64,
    pub cache: CacheConfig,
    pub asset_cache_dir: PathBuf,
    pub asset_path_prefix: String,
    pub asset_max_size: u64,
    pub asset_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            base_url: None,
            fetch_timeout_secs: 30,
            cache: CacheConfig::default(),
            asset_cache_dir: PathBuf::from("./cache/assets"),
            asset_path_prefix: asset_store::DEFAULT_PATH_PREFIX.to_string(),
            asset_max_size: 512 * 1024 * 1024, // 512MB
            asset_ttl_secs: asset_store::DEFAULT_TTL_SECS,
        }
    }
}

/// `?url=` query parameter
#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: String,
}

/// Optional `?url=` for cache invalidation
#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreloadRequest {
    pub urls: Vec<String>,
}

/// Result of resolving a URL; `handle` is null when it could not be loaded
#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub url: String,
    pub handle: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HasResponse {
    pub url: String,
    pub present: bool,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
    pub assets: AssetStats,
}
