//! In-memory media cache
//!
//! Resolves image URLs to `data:` URIs, fetching each supported URL once and
//! keeping the bytes in memory. Entries are evicted by age, entry count and
//! total size.
//!
//! # Example
//!
//! ```no_run
//! use media_cache::{CacheConfig, HttpTransport, MediaCache};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let cache = Arc::new(MediaCache::new(
//!     CacheConfig::default(),
//!     Arc::new(HttpTransport::new()),
//! ));
//! cache.start_sweeper();
//!
//! if let Some(handle) = cache.load_file("https://cdn.example.com/avatar/42.png").await {
//!     println!("{}", &handle[..32]);
//! }
//! # }
//! ```
//!
//! Concurrent misses for the same URL are coalesced onto one fetch.

mod cache;
mod classifier;
mod error;
mod eviction;
mod transport;
mod types;

pub use cache::MediaCache;
pub use classifier::{classify, content_type_for, is_supported, MediaType};
pub use error::{LoadError, Result};
pub use transport::{FetchedMedia, HttpTransport, Transport};
pub use types::{CacheConfig, CacheEntry, CacheStats, EvictionReport};
