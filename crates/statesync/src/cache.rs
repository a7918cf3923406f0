//! Shared LRU/TTL cache with stale-while-revalidate semantics (C4).

use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;

/// Default capacity when none is given at construction.
pub const DEFAULT_CAPACITY: usize = 100;

struct StoredEntry {
    data: Value,
    timestamp: Instant,
}

/// The result of a cache lookup: the cached data plus whether it is old
/// enough to be revalidated in the background.
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// The cached value.
    pub data: Value,
    /// `true` once the entry's age exceeds half its TTL but has not yet
    /// expired outright.
    pub stale: bool,
}

/// A bounded, TTL-aware cache keyed by arbitrary strings.
///
/// Entries older than `ttl` are treated as absent and evicted on access.
/// Entries older than `ttl / 2` are still returned, but flagged `stale` so
/// a caller can trigger a background revalidation.
pub struct Cache {
    inner: Mutex<LruCache<String, StoredEntry>>,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.inner.lock().len())
            .finish()
    }
}

impl Cache {
    /// A cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity)
            .unwrap_or_else(|| std::num::NonZeroUsize::new(DEFAULT_CAPACITY).expect("nonzero"));
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up `key`. Entries past `ttl` are evicted and treated as a miss.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<CacheHit> {
        let mut guard = self.inner.lock();
        let entry = guard.peek(key)?;
        let age = entry.timestamp.elapsed();

        if age >= ttl {
            guard.pop(key);
            return None;
        }

        let stale = age > ttl / 2;
        let data = guard.get(key).expect("just peeked").data.clone();
        Some(CacheHit { data, stale })
    }

    /// Insert or replace `key`'s entry, resetting its age to zero and
    /// refreshing its LRU position.
    pub fn set(&self, key: impl Into<String>, data: Value) {
        self.inner.lock().put(
            key.into(),
            StoredEntry {
                data,
                timestamp: Instant::now(),
            },
        );
    }

    /// Remove a single key.
    pub fn clear(&self, key: &str) {
        self.inner.lock().pop(key);
    }

    /// Remove every key starting with `prefix`.
    pub fn clear_prefix(&self, prefix: &str) {
        let mut guard = self.inner.lock();
        let stale_keys: Vec<String> = guard
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale_keys {
            guard.pop(&key);
        }
    }

    /// Number of entries currently stored, including ones that have not
    /// yet been lazily evicted by access.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_hit_is_not_stale() {
        let cache = Cache::new(10);
        cache.set("k", serde_json::json!({"a": 1}));
        let hit = cache.get("k", Duration::from_secs(60)).unwrap();
        assert!(!hit.stale);
    }

    #[test]
    fn stale_after_half_ttl() {
        let cache = Cache::new(10);
        cache.inner.lock().put(
            "k".to_string(),
            StoredEntry {
                data: serde_json::json!(1),
                timestamp: Instant::now() - Duration::from_millis(60),
            },
        );
        let hit = cache.get("k", Duration::from_millis(100)).unwrap();
        assert!(hit.stale);
    }

    #[test]
    fn expired_entry_evicted() {
        let cache = Cache::new(10);
        cache.inner.lock().put(
            "k".to_string(),
            StoredEntry {
                data: serde_json::json!(1),
                timestamp: Instant::now() - Duration::from_millis(200),
            },
        );
        assert!(cache.get("k", Duration::from_millis(100)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_prefix_removes_matching_keys_only() {
        let cache = Cache::new(10);
        cache.set("users/u1", serde_json::json!(1));
        cache.set("users/u2", serde_json::json!(2));
        cache.set("todos/t1", serde_json::json!(3));
        cache.clear_prefix("users/");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_evicts_lru_tail() {
        let cache = Cache::new(2);
        cache.set("a", serde_json::json!(1));
        cache.set("b", serde_json::json!(2));
        cache.set("c", serde_json::json!(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a", Duration::from_secs(60)).is_none());
    }
}
