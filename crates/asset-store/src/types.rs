//! Asset store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index record for one stored asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEntry {
    pub url: String,
    /// File name inside the cache directory
    pub file: String,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Statistics about the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}
