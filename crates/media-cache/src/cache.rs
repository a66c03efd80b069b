//! In-memory media cache keyed by URL

use crate::classifier::{content_type_for, is_supported};
use crate::error::{LoadError, Result};
use crate::eviction::evict;
use crate::transport::Transport;
use crate::types::{bytes_to_mb, CacheConfig, CacheEntry, CacheStats, EvictionReport};
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

type InFlightLoad = Shared<BoxFuture<'static, Result<String>>>;

/// Process-wide cache of small media files, resolved to `data:` URIs
///
/// Construct once, share through an `Arc`, and call [`MediaCache::start_sweeper`]
/// from inside a tokio runtime to get the periodic cleanup.
pub struct MediaCache {
    inner: Arc<Inner>,
    sweeper: StdMutex<Option<JoinHandle<()>>>,
}

struct Inner {
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Fetches currently on the wire, joined by concurrent callers
    in_flight: Mutex<HashMap<String, InFlightLoad>>,
    transport: Arc<dyn Transport>,
    config: CacheConfig,
    next_seq: AtomicU64,
    inserts: AtomicU64,
}

impl MediaCache {
    /// Create a cache with the given limits and transport
    pub fn new(config: CacheConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                transport,
                config,
                next_seq: AtomicU64::new(0),
                inserts: AtomicU64::new(0),
            }),
            sweeper: StdMutex::new(None),
        }
    }

    /// Look up a URL without touching the network
    ///
    /// Expired entries are removed on the way out.
    pub async fn get_file(&self, url: &str) -> Option<String> {
        if !is_supported(url) {
            return None;
        }
        let now = Utc::now();

        {
            let entries = self.inner.entries.read().await;
            match entries.get(url) {
                None => {
                    debug!(url = %url, "Cache miss");
                    return None;
                }
                Some(entry) if entry.age(now) <= self.inner.config.max_age => {
                    debug!(url = %url, "Cache hit");
                    return Some(entry.to_data_uri());
                }
                Some(_) => {}
            }
        }

        self.inner.remove_if_expired(url, now).await;
        None
    }

    /// Resolve a URL to a displayable handle, fetching it on a miss
    ///
    /// Unsupported URLs come back unchanged. Failures are logged and
    /// collapse to `None`; use [`MediaCache::try_load_file`] for the reason.
    pub async fn load_file(&self, url: &str) -> Option<String> {
        match self.try_load_file(url).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to load media");
                None
            }
        }
    }

    /// Like [`MediaCache::load_file`] but reports why a load failed
    ///
    /// Concurrent misses for the same URL share one fetch. The fetch runs as
    /// its own task, so it still lands in the cache when every caller waiting
    /// on it is dropped. Must be called from inside a tokio runtime.
    pub async fn try_load_file(&self, url: &str) -> Result<String> {
        if !is_supported(url) {
            return Ok(url.to_string());
        }

        if let Some(handle) = self.get_file(url).await {
            return Ok(handle);
        }

        let load = {
            let mut in_flight = self.inner.in_flight.lock().await;
            in_flight
                .entry(url.to_string())
                .or_insert_with(|| {
                    let inner = Arc::clone(&self.inner);
                    let url = url.to_string();
                    let task = tokio::spawn(Arc::clone(&inner).fetch_and_insert(url.clone()));
                    async move {
                        match task.await {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                // The task never reached its own cleanup
                                inner.in_flight.lock().await.remove(&url);
                                Err(LoadError::Storage(format!("load task failed: {e}")))
                            }
                        }
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };

        load.await
    }

    /// Whether a fresh entry exists for `url`; expired entries are removed
    pub async fn has_file(&self, url: &str) -> bool {
        let now = Utc::now();

        {
            let entries = self.inner.entries.read().await;
            match entries.get(url) {
                None => return false,
                Some(entry) if entry.age(now) <= self.inner.config.max_age => return true,
                Some(_) => {}
            }
        }

        self.inner.remove_if_expired(url, now).await;
        false
    }

    /// Drop one entry; a missing URL is a no-op
    pub async fn clear_file_cache(&self, url: &str) {
        if self.inner.entries.write().await.remove(url).is_some() {
            debug!(url = %url, "Removed cache entry");
        }
    }

    /// Drop every entry
    ///
    /// Handles handed out earlier stay valid strings, but nothing backs them
    /// in the cache anymore.
    pub async fn clear_cache(&self) {
        let mut entries = self.inner.entries.write().await;
        let count = entries.len();
        entries.clear();
        info!(count, "Cleared media cache");
    }

    /// Warm the cache for a list of URLs, a batch at a time
    ///
    /// Unsupported URLs are skipped and failures never stop the remaining
    /// batches.
    pub async fn preload_files<S: AsRef<str>>(&self, urls: &[S]) {
        let supported: Vec<&str> = urls
            .iter()
            .map(|u| u.as_ref())
            .filter(|u| is_supported(u))
            .collect();

        let batch_size = self.inner.config.preload_batch_size.max(1);
        for batch in supported.chunks(batch_size) {
            let results = join_all(batch.iter().map(|url| self.try_load_file(url))).await;
            for (url, result) in batch.iter().zip(results) {
                if let Err(e) = result {
                    warn!(url = %url, error = %e, "Failed to preload media");
                }
            }
        }

        debug!(count = supported.len(), "Preload finished");
    }

    /// Read-only snapshot of the cache contents
    pub async fn get_cache_stats(&self) -> CacheStats {
        let entries = self.inner.entries.read().await;
        let mut stats = CacheStats {
            count: entries.len(),
            ..CacheStats::default()
        };

        for entry in entries.values() {
            stats.size += entry.size;
            *stats
                .types
                .entry(entry.media_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats.size_mb = bytes_to_mb(stats.size);

        stats
    }

    /// Store a pre-built entry
    ///
    /// Returns `false` and stores nothing when the URL is not cacheable. Size
    /// and media type are re-derived before the entry is counted.
    pub async fn insert_entry(&self, entry: CacheEntry) -> bool {
        if !is_supported(&entry.url) {
            return false;
        }
        self.inner.insert(entry).await;
        true
    }

    /// Run the age, count and size passes now
    pub async fn run_cleanup(&self) -> EvictionReport {
        self.inner.run_cleanup().await
    }

    /// Start the periodic sweep on the current tokio runtime
    ///
    /// Calling it again replaces the previous sweeper. The task stops by
    /// itself once the cache is dropped.
    pub fn start_sweeper(&self) {
        let period = self.inner.config.sweep_interval;
        if period.is_zero() {
            warn!("Sweep interval is zero, periodic cleanup disabled");
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            // The first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.run_cleanup().await;
            }
        });

        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
        info!(interval_secs = period.as_secs(), "Started media cache sweeper");
    }

    /// Stop the sweeper and drop every entry
    pub async fn shutdown(&self) {
        self.stop_sweeper();
        self.clear_cache().await;
    }

    fn stop_sweeper(&self) {
        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for MediaCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

impl Inner {
    async fn fetch_and_insert(self: Arc<Self>, url: String) -> Result<String> {
        let outcome = match self.fetch_entry(&url).await {
            Ok(entry) => {
                let handle = entry.to_data_uri();
                self.insert(entry).await;
                Ok(handle)
            }
            Err(e) => Err(e),
        };

        self.in_flight.lock().await.remove(&url);
        outcome
    }

    async fn fetch_entry(&self, url: &str) -> Result<CacheEntry> {
        let fetched = self.transport.fetch(url).await?;

        if !fetched.is_success() {
            return Err(LoadError::Fetch {
                status: fetched.status,
            });
        }

        let content_type = fetched
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
            .unwrap_or_else(|| content_type_for(url))
            .to_string();

        Ok(CacheEntry::new(url, fetched.body, &content_type))
    }

    async fn insert(&self, mut entry: CacheEntry) {
        entry.normalize();
        entry.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(
            url = %entry.url,
            size = entry.size,
            media_type = %entry.media_type,
            "Cached media"
        );
        self.entries.write().await.insert(entry.url.clone(), entry);

        let every = self.config.cleanup_every;
        let inserted = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if every > 0 && inserted % every == 0 {
            self.run_cleanup().await;
        }
    }

    async fn remove_if_expired(&self, url: &str, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        // Re-check under the write lock: a fresh copy may have landed meanwhile
        let expired = entries
            .get(url)
            .map(|e| e.age(now) > self.config.max_age)
            .unwrap_or(false);
        if expired {
            entries.remove(url);
            debug!(url = %url, "Cache entry expired");
        }
    }

    async fn run_cleanup(&self) -> EvictionReport {
        let mut entries = self.entries.write().await;
        let report = evict(&mut entries, &self.config, Utc::now());

        if report.total() > 0 {
            info!(
                expired = report.expired,
                over_count = report.over_count,
                oversized = report.oversized,
                remaining = entries.len(),
                "Media cache cleanup"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::MediaType;
    use crate::transport::FetchedMedia;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Serves `size` bytes for any URL, failing the ones listed
    struct MockTransport {
        calls: AtomicUsize,
        /// Fetches currently inside `fetch`, and the highest value seen
        active: AtomicUsize,
        peak: AtomicUsize,
        failing: HashSet<String>,
        content_type: Option<String>,
        delay: Option<Duration>,
        size: usize,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                failing: HashSet::new(),
                content_type: Some("image/png".to_string()),
                delay: None,
                size: 16,
            }
        }

        fn failing(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch(&self, url: &str) -> Result<FetchedMedia> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(url) {
                return Ok(FetchedMedia {
                    status: 404,
                    content_type: None,
                    body: vec![],
                });
            }
            Ok(FetchedMedia {
                status: 200,
                content_type: self.content_type.clone(),
                body: vec![7u8; self.size],
            })
        }
    }

    fn cache_with(config: CacheConfig, transport: Arc<MockTransport>) -> MediaCache {
        MediaCache::new(config, transport)
    }

    fn aged_entry(url: &str, size: usize, age: ChronoDuration) -> CacheEntry {
        CacheEntry::with_created_at(url, vec![0u8; size], "image/png", Utc::now() - age)
    }

    #[tokio::test]
    async fn test_unsupported_url_passes_through() {
        let transport = Arc::new(MockTransport::new());
        let cache = cache_with(CacheConfig::default(), transport.clone());

        let url = "https://cdn.example.com/clips/intro.mp4";
        assert_eq!(cache.load_file(url).await, Some(url.to_string()));
        assert_eq!(transport.calls(), 0);
        assert_eq!(cache.get_cache_stats().await.count, 0);
        assert!(cache.get_file(url).await.is_none());
    }

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let transport = Arc::new(MockTransport::new());
        let cache = cache_with(CacheConfig::default(), transport.clone());

        let first = cache.load_file("/img/a.png").await.unwrap();
        let second = cache.load_file("/img/a.png").await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(first, second);
        assert!(first.starts_with("data:image/png;base64,"));
        assert!(cache.has_file("/img/a.png").await);
    }

    #[tokio::test]
    async fn test_get_file_never_fetches() {
        let transport = Arc::new(MockTransport::new());
        let cache = cache_with(CacheConfig::default(), transport.clone());

        assert!(cache.get_file("/img/a.png").await.is_none());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_returns_none() {
        let transport = Arc::new(MockTransport::new().failing("/img/gone.png"));
        let cache = cache_with(CacheConfig::default(), transport.clone());

        assert_eq!(
            cache.try_load_file("/img/gone.png").await,
            Err(LoadError::Fetch { status: 404 })
        );
        assert!(cache.load_file("/img/gone.png").await.is_none());
        assert!(!cache.has_file("/img/gone.png").await);
    }

    #[tokio::test]
    async fn test_content_type_inferred_when_missing() {
        let mut mock = MockTransport::new();
        mock.content_type = Some("application/octet-stream".to_string());
        let cache = cache_with(CacheConfig::default(), Arc::new(mock));

        let handle = cache.load_file("/icons/star.svg").await.unwrap();
        assert!(handle.starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn test_content_type_parameters_stripped() {
        let mut mock = MockTransport::new();
        mock.content_type = Some("image/svg+xml; charset=utf-8".to_string());
        let cache = cache_with(CacheConfig::default(), Arc::new(mock));

        let handle = cache.load_file("/icons/star.svg").await.unwrap();
        assert!(handle.starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn test_expired_entry_removed_by_cleanup() {
        let cache = cache_with(CacheConfig::default(), Arc::new(MockTransport::new()));
        cache
            .insert_entry(aged_entry("/img/old.png", 4, ChronoDuration::days(8)))
            .await;
        cache
            .insert_entry(aged_entry("/img/new.png", 4, ChronoDuration::days(1)))
            .await;

        let report = cache.run_cleanup().await;

        assert_eq!(report.expired, 1);
        assert!(!cache.has_file("/img/old.png").await);
        assert!(cache.has_file("/img/new.png").await);
        assert_eq!(cache.get_cache_stats().await.count, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_removed_on_lookup() {
        let cache = cache_with(CacheConfig::default(), Arc::new(MockTransport::new()));
        cache
            .insert_entry(aged_entry("/img/old.png", 4, ChronoDuration::days(8)))
            .await;
        assert_eq!(cache.get_cache_stats().await.count, 1);

        assert!(cache.get_file("/img/old.png").await.is_none());
        assert_eq!(cache.get_cache_stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let transport = Arc::new(MockTransport::new());
        let cache = cache_with(CacheConfig::default(), transport.clone());
        cache
            .insert_entry(aged_entry("/img/old.png", 4, ChronoDuration::days(8)))
            .await;

        assert!(cache.load_file("/img/old.png").await.is_some());
        assert_eq!(transport.calls(), 1);
        assert!(cache.has_file("/img/old.png").await);
    }

    #[tokio::test]
    async fn test_count_eviction_keeps_newest() {
        let config = CacheConfig {
            max_entries: 10,
            cleanup_every: 0,
            ..CacheConfig::default()
        };
        let cache = cache_with(config, Arc::new(MockTransport::new()));

        for i in 0..15 {
            cache
                .insert_entry(aged_entry(
                    &format!("/img/{i}.png"),
                    1,
                    ChronoDuration::minutes(100 - i),
                ))
                .await;
        }

        let report = cache.run_cleanup().await;

        assert_eq!(report.over_count, 5);
        assert_eq!(cache.get_cache_stats().await.count, 10);
        for i in 0..5 {
            assert!(!cache.has_file(&format!("/img/{i}.png")).await);
        }
        for i in 5..15 {
            assert!(cache.has_file(&format!("/img/{i}.png")).await);
        }
    }

    #[tokio::test]
    async fn test_size_eviction_prefers_largest() {
        let config = CacheConfig {
            max_total_bytes: 1_000,
            cleanup_every: 0,
            ..CacheConfig::default()
        };
        let cache = cache_with(config, Arc::new(MockTransport::new()));

        for i in 1..=10 {
            cache
                .insert_entry(CacheEntry::new(
                    &format!("/img/{i}.png"),
                    vec![0u8; i * 100],
                    "image/png",
                ))
                .await;
        }
        let before = cache.get_cache_stats().await.size;

        let report = cache.run_cleanup().await;
        let after = cache.get_cache_stats().await;

        assert_eq!(report.oversized, 2);
        assert!(after.size < before);
        assert!(!cache.has_file("/img/10.png").await);
        assert!(!cache.has_file("/img/9.png").await);
        assert!(cache.has_file("/img/1.png").await);
    }

    #[tokio::test]
    async fn test_cleanup_triggered_every_nth_insert() {
        let config = CacheConfig {
            max_entries: 1,
            cleanup_every: 3,
            ..CacheConfig::default()
        };
        let cache = cache_with(config, Arc::new(MockTransport::new()));

        cache.load_file("/img/1.png").await;
        cache.load_file("/img/2.png").await;
        assert_eq!(cache.get_cache_stats().await.count, 2);

        cache.load_file("/img/3.png").await;
        assert_eq!(cache.get_cache_stats().await.count, 1);
        assert!(cache.has_file("/img/3.png").await);
    }

    #[tokio::test]
    async fn test_clear_file_cache_missing_url() {
        let cache = cache_with(CacheConfig::default(), Arc::new(MockTransport::new()));

        cache.clear_file_cache("/img/missing.png").await;

        assert_eq!(cache.get_cache_stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_clear_file_cache_and_clear_cache() {
        let cache = cache_with(CacheConfig::default(), Arc::new(MockTransport::new()));
        cache.load_file("/img/a.png").await;
        cache.load_file("/img/b.png").await;

        cache.clear_file_cache("/img/a.png").await;
        assert!(!cache.has_file("/img/a.png").await);
        assert!(cache.has_file("/img/b.png").await);

        cache.clear_cache().await;
        assert_eq!(cache.get_cache_stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_preload_isolates_failures() {
        let transport = Arc::new(MockTransport::new().failing("/img/3.png"));
        let cache = cache_with(CacheConfig::default(), transport.clone());
        let urls: Vec<String> = (1..=5).map(|i| format!("/img/{i}.png")).collect();

        cache.preload_files(&urls[..]).await;

        assert_eq!(transport.calls(), 5);
        assert_eq!(cache.get_cache_stats().await.count, 4);
        assert!(!cache.has_file("/img/3.png").await);
        for i in [1, 2, 4, 5] {
            assert!(cache.has_file(&format!("/img/{i}.png")).await);
        }
    }

    #[tokio::test]
    async fn test_preload_skips_unsupported_and_spans_batches() {
        let transport = Arc::new(MockTransport::new());
        let config = CacheConfig {
            preload_batch_size: 2,
            ..CacheConfig::default()
        };
        let cache = cache_with(config, transport.clone());

        cache
            .preload_files(&[
                "/a.png",
                "/b.jpg",
                "/c.webp",
                "/clip.mp4",
                "/api/feed",
            ])
            .await;

        assert_eq!(transport.calls(), 3);
        assert_eq!(cache.get_cache_stats().await.count, 3);
    }

    #[tokio::test]
    async fn test_preload_bounds_concurrent_fetches() {
        let transport = Arc::new(MockTransport::new().delayed(Duration::from_millis(20)));
        let cache = cache_with(CacheConfig::default(), transport.clone());
        let urls: Vec<String> = (0..12).map(|i| format!("/img/{i}.png")).collect();

        cache.preload_files(&urls[..]).await;

        assert_eq!(transport.calls(), 12);
        assert_eq!(transport.peak(), 5);
        assert_eq!(cache.get_cache_stats().await.count, 12);
    }

    #[tokio::test]
    async fn test_preload_batch_size_one_is_sequential() {
        let transport = Arc::new(MockTransport::new().delayed(Duration::from_millis(5)));
        let config = CacheConfig {
            preload_batch_size: 1,
            ..CacheConfig::default()
        };
        let cache = cache_with(config, transport.clone());

        cache.preload_files(&["/a.png", "/b.png", "/c.png"]).await;

        assert_eq!(transport.calls(), 3);
        assert_eq!(transport.peak(), 1);
    }

    #[tokio::test]
    async fn test_stats_breakdown() {
        let cache = cache_with(CacheConfig::default(), Arc::new(MockTransport::new()));
        let entries = [
            ("/badges/gold.png", 100),
            ("/avatars/u1.jpg", 200),
            ("/avatars/u2.jpg", 300),
            ("/icons/home.svg", 50),
            ("/photos/sunset.webp", 1024),
        ];
        for (url, size) in entries {
            cache
                .insert_entry(CacheEntry::new(url, vec![0u8; size], "image/png"))
                .await;
        }

        let stats = cache.get_cache_stats().await;

        assert_eq!(stats.count, 5);
        assert_eq!(stats.size, 1674);
        assert!((stats.size_mb - 1674.0 / 1_048_576.0).abs() < f64::EPSILON);
        assert_eq!(stats.types.get(MediaType::Badge.as_str()), Some(&1));
        assert_eq!(stats.types.get(MediaType::Avatar.as_str()), Some(&2));
        assert_eq!(stats.types.get(MediaType::Svg.as_str()), Some(&1));
        assert_eq!(stats.types.get(MediaType::Image.as_str()), Some(&1));
        assert_eq!(stats.types.get(MediaType::Other.as_str()), None);
    }

    #[tokio::test]
    async fn test_insert_entry_rederives_size_and_type() {
        let config = CacheConfig {
            max_total_bytes: 1_000,
            cleanup_every: 0,
            ..CacheConfig::default()
        };
        let cache = cache_with(config, Arc::new(MockTransport::new()));

        for i in 0..10 {
            let mut entry =
                CacheEntry::new(&format!("/img/{i}.png"), vec![0u8; 2_000], "image/png");
            entry.size = 0;
            entry.media_type = MediaType::Badge;
            cache.insert_entry(entry).await;
        }

        let stats = cache.get_cache_stats().await;
        assert_eq!(stats.size, 20_000);
        assert_eq!(stats.types.get(MediaType::Image.as_str()), Some(&10));
        assert_eq!(stats.types.get(MediaType::Badge.as_str()), None);

        let report = cache.run_cleanup().await;
        assert_eq!(report.oversized, 2);
        assert_eq!(cache.get_cache_stats().await.count, 8);
    }

    #[tokio::test]
    async fn test_insert_entry_rejects_unsupported() {
        let cache = cache_with(CacheConfig::default(), Arc::new(MockTransport::new()));
        let stored = cache
            .insert_entry(CacheEntry::new("/media/clip.mp4", vec![1], "video/mp4"))
            .await;
        assert!(!stored);
        assert_eq!(cache.get_cache_stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_fetch() {
        let transport = Arc::new(MockTransport::new().delayed(Duration::from_millis(50)));
        let cache = cache_with(CacheConfig::default(), transport.clone());

        let (a, b) = tokio::join!(
            cache.load_file("/img/shared.png"),
            cache.load_file("/img/shared.png")
        );

        assert_eq!(transport.calls(), 1);
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(cache.get_cache_stats().await.count, 1);
    }

    #[tokio::test]
    async fn test_abandoned_load_still_completes() {
        let transport = Arc::new(MockTransport::new().delayed(Duration::from_millis(50)));
        let cache = cache_with(CacheConfig::default(), transport.clone());

        let gave_up =
            tokio::time::timeout(Duration::from_millis(10), cache.load_file("/img/slow.png")).await;
        assert!(gave_up.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.has_file("/img/slow.png").await);
        assert!(cache.load_file("/img/slow.png").await.is_some());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_can_be_retried() {
        let transport = Arc::new(MockTransport::new().failing("/img/flaky.png"));
        let cache = cache_with(CacheConfig::default(), transport.clone());

        assert!(cache.load_file("/img/flaky.png").await.is_none());
        assert!(cache.load_file("/img/flaky.png").await.is_none());

        // The in-flight slot is released after each failure
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_without_inserts() {
        let config = CacheConfig {
            sweep_interval: Duration::from_millis(20),
            ..CacheConfig::default()
        };
        let cache = cache_with(config, Arc::new(MockTransport::new()));
        cache
            .insert_entry(aged_entry("/img/old.png", 4, ChronoDuration::days(8)))
            .await;

        cache.start_sweeper();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.get_cache_stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_shutdown_clears_entries() {
        let cache = cache_with(CacheConfig::default(), Arc::new(MockTransport::new()));
        cache.start_sweeper();
        cache.load_file("/img/a.png").await;

        cache.shutdown().await;

        assert_eq!(cache.get_cache_stats().await.count, 0);
        assert!(cache.sweeper.lock().unwrap().is_none());
    }
}
