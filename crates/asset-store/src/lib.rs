//! On-disk asset cache scoped to one URL path prefix
//!
//! Stores binary assets as files with an in-memory index that is mirrored to
//! `index.json`, so entries survive restarts. Entries expire after a TTL and
//! the oldest are evicted when the size budget is exceeded.
//!
//! This store is independent of the in-memory media cache: different key
//! space, different TTL, no shared entries.

mod error;
mod store;
mod types;

pub use error::{AssetStoreError, Result};
pub use store::{AssetStore, DEFAULT_PATH_PREFIX, DEFAULT_TTL_SECS};
pub use types::{AssetEntry, AssetStats};
