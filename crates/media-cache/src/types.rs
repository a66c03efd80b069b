//! Core types for the media cache

use crate::classifier::{classify, MediaType};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// One cached URL and its bytes
///
/// `size` and `media_type` are derived from the content and URL and cannot be
/// set from outside the crate.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub(crate) url: String,
    pub(crate) content: Vec<u8>,
    pub(crate) content_type: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) media_type: MediaType,
    pub(crate) size: u64,
    /// Insertion sequence, assigned by the cache
    pub(crate) seq: u64,
}

impl CacheEntry {
    /// Build an entry stamped with the current time
    pub fn new(url: &str, content: Vec<u8>, content_type: &str) -> Self {
        Self::with_created_at(url, content, content_type, Utc::now())
    }

    /// Build an entry with an explicit creation time
    pub fn with_created_at(
        url: &str,
        content: Vec<u8>,
        content_type: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.to_string(),
            size: content.len() as u64,
            content,
            content_type: content_type.to_string(),
            created_at,
            media_type: classify(url),
            seq: 0,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Byte length of the content
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Re-derive `size` and `media_type` from the content and URL
    pub(crate) fn normalize(&mut self) {
        self.size = self.content.len() as u64;
        self.media_type = classify(&self.url);
    }

    /// Age of the entry relative to `now`; entries from the future count as new
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    /// Encode the bytes as a `data:` URI a renderer can display directly
    ///
    /// Every call allocates a new string; nothing tracks handed-out handles.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.content)
        )
    }
}

/// Snapshot of cache contents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    /// Total bytes across all entries
    pub size: u64,
    #[serde(rename = "sizeMB")]
    pub size_mb: f64,
    /// Entry count per media type
    pub types: BTreeMap<String, usize>,
}

/// What a cleanup run removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub expired: usize,
    pub over_count: usize,
    pub oversized: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.expired + self.over_count + self.oversized
    }
}

/// Limits and timings for a [`crate::MediaCache`]
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_age: Duration,
    pub max_entries: usize,
    pub max_total_bytes: u64,
    pub preload_batch_size: usize,
    /// Run cleanup after every N successful insertions
    pub cleanup_every: u64,
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Convenience for expressing the byte budget in megabytes
    pub fn with_max_total_mb(mut self, mb: u64) -> Self {
        self.max_total_bytes = mb * MB;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            max_entries: 10_000,
            max_total_bytes: 1000 * MB,
            preload_batch_size: 5,
            cleanup_every: 10,
            sweep_interval: Duration::from_secs(10 * 60), // 10 minutes
        }
    }
}

/// Convert a byte count to megabytes for reporting
pub(crate) fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / MB as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_age, Duration::from_secs(604_800));
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.max_total_bytes, 1000 * 1024 * 1024);
        assert_eq!(config.preload_batch_size, 5);
        assert_eq!(config.cleanup_every, 10);
        assert_eq!(config.sweep_interval, Duration::from_secs(600));
    }

    #[test]
    fn test_with_max_total_mb() {
        let config = CacheConfig::default().with_max_total_mb(2);
        assert_eq!(config.max_total_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_entry_derives_size_and_type() {
        let entry = CacheEntry::new("/badges/gold.png", vec![0u8; 42], "image/png");
        assert_eq!(entry.size(), 42);
        assert_eq!(entry.media_type(), MediaType::Badge);
        assert_eq!(entry.url(), "/badges/gold.png");
        assert_eq!(entry.content().len(), 42);
        assert_eq!(entry.content_type(), "image/png");
    }

    #[test]
    fn test_normalize_restores_derived_fields() {
        let mut entry = CacheEntry::new("/avatars/u1.jpg", vec![0u8; 300], "image/jpeg");
        entry.size = 0;
        entry.media_type = MediaType::Badge;

        entry.normalize();

        assert_eq!(entry.size(), 300);
        assert_eq!(entry.media_type(), MediaType::Avatar);
    }

    #[test]
    fn test_entry_age_never_negative() {
        let future = Utc::now() + chrono::Duration::hours(1);
        let entry = CacheEntry::with_created_at("/a.png", vec![], "image/png", future);
        assert_eq!(entry.age(Utc::now()), Duration::ZERO);
    }

    #[test]
    fn test_data_uri() {
        let entry = CacheEntry::new("/a.svg", b"<svg/>".to_vec(), "image/svg+xml");
        assert_eq!(entry.to_data_uri(), "data:image/svg+xml;base64,PHN2Zy8+");
    }

    #[test]
    fn test_cache_stats_serialization() {
        let mut types = BTreeMap::new();
        types.insert("image".to_string(), 2);
        let stats = CacheStats {
            count: 2,
            size: 2048,
            size_mb: bytes_to_mb(2048),
            types,
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["size"], 2048);
        assert!(json["sizeMB"].as_f64().is_some());
        assert_eq!(json["types"]["image"], 2);
    }

    #[test]
    fn test_eviction_report_total() {
        let report = EvictionReport {
            expired: 1,
            over_count: 2,
            oversized: 3,
        };
        assert_eq!(report.total(), 6);
    }
}
