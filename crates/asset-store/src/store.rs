//! File-based asset storage with a persisted index

use crate::error::Result;
use crate::types::{AssetEntry, AssetStats};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

const INDEX_FILE: &str = "index.json";

/// Default URL path prefix served from this store
pub const DEFAULT_PATH_PREFIX: &str = "/assets/";
/// Default time-to-live: 7 days
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Entries keyed by hashed URL, with their byte total kept in step
#[derive(Default)]
struct Index {
    entries: HashMap<String, AssetEntry>,
    total_size: u64,
}

impl Index {
    fn insert(&mut self, key: String, entry: AssetEntry) {
        self.total_size += entry.size;
        if let Some(replaced) = self.entries.insert(key, entry) {
            self.total_size = self.total_size.saturating_sub(replaced.size);
        }
    }

    fn remove(&mut self, key: &str) -> Option<AssetEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size = self.total_size.saturating_sub(entry.size);
        Some(entry)
    }

    /// Keys to drop, oldest first, so that `incoming` bytes stored under
    /// `key` fit within `max_size`. The copy being replaced is never listed.
    fn eviction_victims(&self, key: &str, incoming: u64, max_size: u64) -> Vec<String> {
        let replaced = self.entries.get(key).map_or(0, |e| e.size);
        let mut projected = self.total_size.saturating_sub(replaced) + incoming;
        if projected <= max_size {
            return Vec::new();
        }

        let mut oldest: Vec<(&String, &AssetEntry)> =
            self.entries.iter().filter(|(k, _)| k.as_str() != key).collect();
        oldest.sort_by_key(|(_, e)| e.created_at);

        oldest
            .into_iter()
            .take_while(|(_, e)| {
                let still_over = projected > max_size;
                projected = projected.saturating_sub(e.size);
                still_over
            })
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// An asset cache with file storage and an index kept in memory and on disk
pub struct AssetStore {
    index: RwLock<Index>,
    cache_dir: PathBuf,
    path_prefix: String,
    /// Maximum total size in bytes
    max_size: u64,
    ttl_secs: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AssetStore {
    /// Create a new asset store; call [`AssetStore::init`] before use
    pub fn new(cache_dir: PathBuf, path_prefix: &str, max_size: u64, ttl_secs: u64) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            cache_dir,
            path_prefix: path_prefix.to_string(),
            max_size,
            ttl_secs,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Ensure the directory exists and reload the index left by a previous run
    ///
    /// Index entries whose file is gone or whose TTL has passed are dropped.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;

        let index_path = self.cache_dir.join(INDEX_FILE);
        let loaded: HashMap<String, AssetEntry> = match fs::read(&index_path).await {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(index) => index,
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable asset index");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        let mut index = self.index.write().await;
        *index = Index::default();
        for (key, entry) in loaded {
            let path = self.cache_dir.join(&entry.file);
            if self.is_expired(&entry) || fs::metadata(&path).await.is_err() {
                let _ = fs::remove_file(&path).await;
                continue;
            }
            index.insert(key, entry);
        }
        self.persist_index(&index.entries).await?;

        info!(
            cache_dir = ?self.cache_dir,
            entries = index.entries.len(),
            total_size = index.total_size,
            prefix = %self.path_prefix,
            "Asset store initialized"
        );
        Ok(())
    }

    /// Hex SHA-256 of the URL, used as both index key and file name
    pub fn cache_key(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    /// Whether `url` falls under this store's path prefix
    pub fn accepts(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => parsed.path().starts_with(&self.path_prefix),
            Err(_) => url
                .split(['?', '#'])
                .next()
                .unwrap_or(url)
                .starts_with(&self.path_prefix),
        }
    }

    /// Bytes and content type of a fresh stored asset
    ///
    /// Expired or unreadable entries are dropped and count as misses.
    pub async fn get(&self, url: &str) -> Option<(Vec<u8>, String)> {
        if !self.accepts(url) {
            return None;
        }
        let key = Self::cache_key(url);
        let found = self.index.read().await.entries.get(&key).cloned();

        let served = match found {
            None => None,
            Some(entry) if self.is_expired(&entry) => {
                debug!(url = %url, ttl_secs = self.ttl_secs, "Asset expired");
                self.remove_if_unchanged(&key, entry.created_at).await;
                None
            }
            Some(entry) => match fs::read(self.cache_dir.join(&entry.file)).await {
                Ok(data) => Some((data, entry.content_type)),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to read stored asset, removing entry");
                    self.remove_if_unchanged(&key, entry.created_at).await;
                    None
                }
            },
        };

        let counter = if served.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        debug!(url = %url, hit = served.is_some(), "Asset lookup");
        served
    }

    /// Store an asset; returns `false` when the URL is outside the prefix
    ///
    /// Eviction, the file write and the index update happen under one write
    /// lock, so concurrent puts of the same URL leave a single entry counted
    /// once.
    pub async fn put(&self, url: &str, data: &[u8], content_type: &str) -> Result<bool> {
        if !self.accepts(url) {
            return Ok(false);
        }
        let key = Self::cache_key(url);
        let size = data.len() as u64;

        let mut index = self.index.write().await;
        for victim in index.eviction_victims(&key, size, self.max_size) {
            if let Some(evicted) = index.remove(&victim) {
                let _ = fs::remove_file(self.cache_dir.join(&evicted.file)).await;
                debug!(url = %evicted.url, size = evicted.size, "Evicted oldest asset");
            }
        }

        fs::write(self.cache_dir.join(&key), data).await?;
        index.insert(
            key.clone(),
            AssetEntry {
                url: url.to_string(),
                file: key,
                content_type: content_type.to_string(),
                size,
                created_at: Utc::now(),
            },
        );
        self.persist_index(&index.entries).await?;
        debug!(url = %url, size, total_size = index.total_size, "Stored asset");

        Ok(true)
    }

    /// Remove one asset; missing URLs are ignored
    pub async fn remove(&self, url: &str) {
        let key = Self::cache_key(url);
        let mut index = self.index.write().await;
        if let Some(entry) = index.remove(&key) {
            self.discard(&index, &entry).await;
        }
    }

    /// Remove every asset
    pub async fn clear(&self) -> Result<()> {
        let mut index = self.index.write().await;
        for entry in index.entries.values() {
            let _ = fs::remove_file(self.cache_dir.join(&entry.file)).await;
        }
        *index = Index::default();
        self.persist_index(&index.entries).await
    }

    /// Drop every expired asset, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut index = self.index.write().await;
        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, e)| self.is_expired(e))
            .map(|(k, _)| k.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }

        for key in &expired {
            if let Some(entry) = index.remove(key) {
                let _ = fs::remove_file(self.cache_dir.join(&entry.file)).await;
            }
        }
        if let Err(e) = self.persist_index(&index.entries).await {
            warn!(error = %e, "Failed to persist asset index");
        }

        info!(count = expired.len(), remaining = index.entries.len(), "Purged expired assets");
        expired.len()
    }

    /// Entry count and bytes on disk, plus lookup counters since start
    pub async fn stats(&self) -> AssetStats {
        let (entries, total_size) = {
            let index = self.index.read().await;
            (index.entries.len(), index.total_size)
        };
        AssetStats {
            entries,
            total_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, entry: &AssetEntry) -> bool {
        let age_secs = (Utc::now() - entry.created_at).num_seconds().max(0) as u64;
        age_secs > self.ttl_secs
    }

    /// Remove `key` unless a newer copy was stored since it was read
    async fn remove_if_unchanged(&self, key: &str, created_at: DateTime<Utc>) {
        let mut index = self.index.write().await;
        if index.entries.get(key).map(|e| e.created_at) != Some(created_at) {
            return;
        }
        if let Some(entry) = index.remove(key) {
            self.discard(&index, &entry).await;
        }
    }

    /// Delete a removed entry's file and rewrite the index
    async fn discard(&self, index: &Index, entry: &AssetEntry) {
        let _ = fs::remove_file(self.cache_dir.join(&entry.file)).await;
        if let Err(e) = self.persist_index(&index.entries).await {
            warn!(error = %e, "Failed to persist asset index");
        }
    }

    /// Write the index next to the assets, replacing the previous copy atomically
    async fn persist_index(&self, entries: &HashMap<String, AssetEntry>) -> Result<()> {
        let raw = serde_json::to_vec(entries)?;
        let tmp = self.cache_dir.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&tmp, raw).await?;
        fs::rename(&tmp, self.cache_dir.join(INDEX_FILE)).await?;
        Ok(())
    }
}
