//! Age, count and size eviction over the entry map

use crate::types::{CacheConfig, CacheEntry, EvictionReport};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Share of entries dropped by the size pass, largest first
const OVERSIZE_EVICT_FRACTION: f64 = 0.2;

/// Run the three eviction passes in order: age, count, size
///
/// Each pass only sees what the previous one left behind.
pub(crate) fn evict(
    entries: &mut HashMap<String, CacheEntry>,
    config: &CacheConfig,
    now: DateTime<Utc>,
) -> EvictionReport {
    let expired = evict_expired(entries, config, now);
    let over_count = evict_over_count(entries, config);
    let oversized = evict_oversized(entries, config);

    EvictionReport {
        expired,
        over_count,
        oversized,
    }
}

fn evict_expired(
    entries: &mut HashMap<String, CacheEntry>,
    config: &CacheConfig,
    now: DateTime<Utc>,
) -> usize {
    let before = entries.len();
    entries.retain(|url, entry| {
        let keep = entry.age(now) <= config.max_age;
        if !keep {
            debug!(url = %url, "Evicting expired entry");
        }
        keep
    });
    before - entries.len()
}

fn evict_over_count(entries: &mut HashMap<String, CacheEntry>, config: &CacheConfig) -> usize {
    if entries.len() <= config.max_entries {
        return 0;
    }
    let excess = entries.len() - config.max_entries;

    let mut by_age: Vec<(DateTime<Utc>, u64, String)> = entries
        .values()
        .map(|e| (e.created_at, e.seq, e.url.clone()))
        .collect();
    by_age.sort_unstable();

    for (_, _, url) in by_age.into_iter().take(excess) {
        entries.remove(&url);
    }
    excess
}

fn evict_oversized(entries: &mut HashMap<String, CacheEntry>, config: &CacheConfig) -> usize {
    let total: u64 = entries.values().map(|e| e.size).sum();
    if total <= config.max_total_bytes {
        return 0;
    }

    let mut by_size: Vec<(u64, u64, String)> = entries
        .values()
        .map(|e| (e.size, e.seq, e.url.clone()))
        .collect();
    // Largest first; among equal sizes the earlier insertion goes first
    by_size.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let to_remove = (by_size.len() as f64 * OVERSIZE_EVICT_FRACTION).floor() as usize;
    for (_, _, url) in by_size.into_iter().take(to_remove) {
        entries.remove(&url);
    }

    debug!(
        total_bytes = total,
        max_bytes = config.max_total_bytes,
        removed = to_remove,
        "Size budget exceeded"
    );
    to_remove
}
