//! In-memory TTL cache for fetched observations.
//!
//! Uses `DashMap` so concurrent requests for different keys only contend
//! on their own shard. No guard is held across an await.

use common::{Coordinates, LocationKey, WeatherObservation};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// A cached value with the instant it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub cached_at: Instant,
}

impl<V> CacheEntry<V> {
    /// An entry aged exactly `ttl` is still fresh.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.cached_at) > ttl
    }
}

/// What a cache hit hands back: the observation and where it was taken.
#[derive(Debug, Clone)]
pub struct CachedWeather {
    pub observation: WeatherObservation,
    pub coordinates: Coordinates,
}

/// Thread-safe TTL cache keyed by normalized location.
///
/// Expired entries are removed lazily by the `get` that finds them.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<LocationKey, CacheEntry<V>>,
    ttl: Duration,
}

/// The cache the weather service runs with.
pub type WeatherCache = TtlCache<CachedWeather>;

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &LocationKey) -> Option<CacheEntry<V>> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now, self.ttl) {
                return Some(entry.clone());
            }
        }

        // Shard guard is released above; re-check so a concurrent fresh
        // `put` is not thrown away.
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now, self.ttl));
        None
    }

    pub fn put(&self, key: LocationKey, value: V) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &LocationKey) {
        self.entries.remove(key);
    }

    /// Entries currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(raw: &str) -> LocationKey {
        LocationKey::parse(raw).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_served_until_ttl_then_evicted() {
        let cache = TtlCache::new(Duration::from_secs(600));
        cache.put(key("Mumbai"), 42u32);

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get(&key("mumbai")).map(|e| e.value), Some(42));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(
            cache.get(&key("MUMBAI")).map(|e| e.value),
            Some(42),
            "exactly ttl old is still fresh"
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key("Mumbai")).is_none());
        assert!(cache.is_empty(), "expired entry removed on access");
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_refreshes_cached_at() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.put(key("Pune"), "old");

        tokio::time::advance(Duration::from_secs(8)).await;
        cache.put(key("Pune"), "new");

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&key("Pune")).map(|e| e.value), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_linger_until_read() {
        let cache = TtlCache::new(Duration::from_secs(1));
        cache.put(key("Delhi"), 1);
        cache.put(key("Chennai"), 2);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.len(), 2, "no active sweeping");

        assert!(cache.get(&key("Delhi")).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_and_gets() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let mut handles = Vec::new();

        for i in 0..16u32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let k = key(&format!("city {}", i % 4));
                for n in 0..100 {
                    cache.put(k.clone(), n);
                    assert!(cache.get(&k).is_some());
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 4);
    }
}
