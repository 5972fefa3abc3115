//! TTL + LRU cache store.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::entry::CacheEntry;
use super::key::CacheKey;
use super::lru::LruTracker;
use super::stats::{CacheStats, StatsCounters};
use crate::observability::metrics;

/// Bounded cache with per-entry TTL and least-recently-used eviction.
///
/// Callers contending for the cache suspend on an async mutex rather than
/// spinning. The lock is never held across a caller-supplied future.
#[derive(Debug)]
pub struct TtlCache<V> {
    name: String,
    capacity: usize,
    default_ttl: Duration,
    state: Mutex<CacheState<V>>,
    stats: StatsCounters,
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    recency: LruTracker<CacheKey>,
}

impl<V> CacheState<V> {
    fn remove(&mut self, key: &CacheKey) -> bool {
        self.recency.remove(key);
        self.entries.remove(key).is_some()
    }
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache. A capacity of 0 is treated as 1.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: usize, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            default_ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: LruTracker::new(),
            }),
            stats: StatsCounters::default(),
        }
    }

    /// Cache name used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// TTL applied by [`set_default`](Self::set_default).
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a fresh value.
    ///
    /// A hit becomes the most recently used entry. An expired entry is
    /// removed and reported as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        let mut state = self.state.lock().await;

        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                drop(state);
                self.record_miss();
                return None;
            }
        };

        if expired {
            state.remove(key);
            let size = state.entries.len();
            drop(state);
            self.stats.expirations(1);
            metrics::record_cache_expirations(&self.name, 1);
            metrics::update_cache_size(&self.name, size);
            self.record_miss();
            tracing::trace!(cache = %self.name, key = %key, "Expired entry removed on read");
            return None;
        }

        state.recency.touch(key);
        let value = state.entries.get(key).map(|entry| entry.value().clone());
        drop(state);
        self.stats.hit();
        metrics::record_cache_lookup(&self.name, true);
        value
    }

    /// Insert or replace a value with an explicit TTL.
    ///
    /// Inserting a new key into a full cache first evicts the least recently
    /// used entry. Replacing an existing key never evicts.
    pub async fn set(&self, key: CacheKey, value: V, ttl: Duration) {
        let mut state = self.state.lock().await;

        let mut evicted = None;
        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            if let Some(victim) = state.recency.pop_least_recent() {
                state.entries.remove(&victim);
                evicted = Some(victim);
            }
        }

        state.recency.touch(&key);
        state.entries.insert(key, CacheEntry::new(value, ttl));
        let size = state.entries.len();
        drop(state);

        if let Some(victim) = evicted {
            self.stats.eviction();
            metrics::record_cache_eviction(&self.name);
            tracing::debug!(cache = %self.name, key = %victim, "Evicted least recently used entry");
        }
        metrics::update_cache_size(&self.name, size);
    }

    /// Insert or replace a value with the cache's default TTL.
    pub async fn set_default(&self, key: CacheKey, value: V) {
        self.set(key, value, self.default_ttl).await;
    }

    /// Remove one entry. Returns whether it was present.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.remove(key);
        let size = state.entries.len();
        drop(state);
        if removed {
            metrics::update_cache_size(&self.name, size);
        }
        removed
    }

    /// Remove every entry.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.recency.clear();
        drop(state);
        metrics::update_cache_size(&self.name, 0);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        let size = state.entries.len();
        drop(state);

        if !expired.is_empty() {
            self.stats.expirations(expired.len() as u64);
            metrics::record_cache_expirations(&self.name, expired.len() as u64);
            metrics::update_cache_size(&self.name, size);
            tracing::debug!(cache = %self.name, removed = expired.len(), "Purged expired entries");
        }
        expired.len()
    }

    /// Read through the cache.
    ///
    /// On a miss `fetch` is awaited without holding the cache lock and a
    /// successful result is stored with `ttl`. Failures are returned as-is
    /// and never cached. Concurrent misses on one key may each fetch.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: CacheKey, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Number of stored entries, including ones not yet found expired.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Snapshot of hit/miss/eviction counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    fn record_miss(&self) {
        self.stats.miss();
        metrics::record_cache_lookup(&self.name, false);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn key(name: &str) -> CacheKey {
        CacheKey::new(name)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_is_miss_and_evicts() {
        let cache = TtlCache::new("test", 4, TTL);
        cache.set(key("a"), 1, Duration::from_secs(10)).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get(&key("a")).await, Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key("a")).await, None);
        assert_eq!(cache.len().await, 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[tokio::test]
    async fn test_capacity_two_evicts_least_recently_used() {
        let cache = TtlCache::new("test", 2, TTL);
        cache.set(key("a"), 1, TTL).await;
        cache.set(key("b"), 2, TTL).await;
        assert_eq!(cache.get(&key("a")).await, Some(1));
        cache.set(key("c"), 3, TTL).await;

        assert_eq!(cache.get(&key("b")).await, None);
        assert_eq!(cache.get(&key("a")).await, Some(1));
        assert_eq!(cache.get(&key("c")).await, Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_upsert_at_capacity_does_not_evict() {
        let cache = TtlCache::new("test", 2, TTL);
        cache.set(key("a"), 1, TTL).await;
        cache.set(key("b"), 2, TTL).await;
        cache.set(key("a"), 10, TTL).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&key("a")).await, Some(10));
        assert_eq!(cache.get(&key("b")).await, Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_recency() {
        let cache = TtlCache::new("test", 2, TTL);
        cache.set(key("a"), 1, TTL).await;
        cache.set(key("b"), 2, TTL).await;
        cache.set(key("a"), 3, TTL).await;
        cache.set(key("c"), 4, TTL).await;

        assert_eq!(cache.get(&key("b")).await, None);
        assert_eq!(cache.get(&key("a")).await, Some(3));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = TtlCache::new("test", 4, TTL);
        cache.set_default(key("a"), 1).await;
        cache.set_default(key("b"), 2).await;

        assert!(cache.invalidate(&key("a")).await);
        assert!(!cache.invalidate(&key("a")).await);
        assert_eq!(cache.get(&key("a")).await, None);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_removes_only_stale_entries() {
        let cache = TtlCache::new("test", 4, TTL);
        cache.set(key("short"), 1, Duration::from_secs(1)).await;
        cache.set(key("long"), 2, Duration::from_secs(100)).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&key("long")).await, Some(2));
    }

    #[tokio::test]
    async fn test_get_or_fetch_caches_success_only() {
        let cache = TtlCache::new("test", 4, TTL);
        let mut calls = 0;

        let first: Result<i64, String> = cache
            .get_or_fetch(key("a"), TTL, || {
                calls += 1;
                async { Ok(7) }
            })
            .await;
        assert_eq!(first, Ok(7));

        let second: Result<i64, String> = cache
            .get_or_fetch(key("a"), TTL, || {
                calls += 1;
                async { Ok(8) }
            })
            .await;
        assert_eq!(second, Ok(7));
        assert_eq!(calls, 1);

        let failed: Result<i64, String> = cache
            .get_or_fetch(key("b"), TTL, || async { Err("down".to_string()) })
            .await;
        assert_eq!(failed, Err("down".to_string()));
        assert_eq!(cache.get(&key("b")).await, None);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache: TtlCache<i64> = TtlCache::new("test", 0, TTL);
        assert_eq!(cache.capacity(), 1);
    }

    proptest! {
        #[test]
        fn prop_population_never_exceeds_capacity(
            capacity in 1usize..8,
            keys in proptest::collection::vec(0u8..16, 0..64),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            runtime.block_on(async {
                let cache = TtlCache::new("prop", capacity, TTL);
                for k in keys {
                    cache.set(CacheKey::new(k.to_string()), k, TTL).await;
                    prop_assert!(cache.len().await <= capacity);
                }
                Ok(())
            })?;
        }

        #[test]
        fn prop_most_recent_key_survives_insert(
            keys in proptest::collection::vec(0u8..16, 2..32),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            runtime.block_on(async {
                let cache = TtlCache::new("prop", 2, TTL);
                let mut previous: Option<u8> = None;
                for k in keys {
                    cache.set(CacheKey::new(k.to_string()), k, TTL).await;
                    if let Some(p) = previous {
                        prop_assert_eq!(cache.get(&CacheKey::new(p.to_string())).await, Some(p));
                    }
                    prop_assert_eq!(cache.get(&CacheKey::new(k.to_string())).await, Some(k));
                    previous = Some(k);
                }
                Ok(())
            })?;
        }
    }
}
