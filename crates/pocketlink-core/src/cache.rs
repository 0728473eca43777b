// ── TTL cache ──
//
// Bounded LRU map whose entries also expire after a time-to-live. Expired
// entries are dropped lazily on access, or eagerly via `purge_expired`.
// Uses tokio's clock so paused-time tests can drive expiry.

use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tracing::trace;

/// Expiry used when `now + ttl` overflows. Roughly thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe LRU cache with per-entry expiry.
pub struct TtlCache<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<K: Hash + Eq, V> TtlCache<K, V> {
    /// `capacity` of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Default time-to-live for [`insert`](Self::insert).
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<K, Entry<V>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    /// Live value for `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.lock();
        let now = Instant::now();
        if cache.peek(key).is_some_and(|e| e.is_expired(now)) {
            cache.pop(key);
            trace!("cache entry expired");
            return None;
        }
        cache.get(key).map(|e| e.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    /// Insert with an explicit time-to-live, evicting the least recently
    /// used entry when full. A TTL too large to represent never expires.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let entry = Entry {
            value,
            expires_at: now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE),
        };
        self.lock().put(key, entry);
    }

    /// Remove and return the value for `key`, expired or not.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().pop(key).map(|e| e.value)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut cache = self.lock();
        let now = Instant::now();
        let expired: Vec<K> = cache
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    /// Cached value for `key`, or the result of `load` which is then
    /// cached. Errors are returned as-is and nothing is stored.
    ///
    /// The lock is not held while `load` runs, so concurrent misses for
    /// the same key may both load.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            trace!("cache hit");
            return Ok(value);
        }
        let value = load().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn cache(capacity: usize) -> TtlCache<String, u32> {
        TtlCache::new(capacity, Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let c = cache(4);
        c.insert("a".into(), 1);
        assert_eq!(c.get(&"a".into()), Some(1));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(c.get(&"a".into()), None);
        assert!(c.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn per_entry_ttl_overrides_default() {
        let c = cache(4);
        c.insert_with_ttl("short".into(), 1, Duration::from_secs(1));
        c.insert("long".into(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(c.get(&"short".into()), None);
        assert_eq!(c.get(&"long".into()), Some(2));
    }

    #[test]
    fn huge_ttl_never_expires() {
        let c: TtlCache<String, u32> = TtlCache::new(4, Duration::MAX);
        c.insert("forever".into(), 7);
        c.insert_with_ttl("also".into(), 8, Duration::MAX);
        assert_eq!(c.get(&"forever".into()), Some(7));
        assert_eq!(c.get(&"also".into()), Some(8));
        assert_eq!(c.purge_expired(), 0);
    }

    #[test]
    fn debug_shows_len_without_clone_bounds() {
        struct Opaque;
        let c: TtlCache<u8, Opaque> = TtlCache::new(2, Duration::from_secs(1));
        let shown = format!("{c:?}");
        assert!(shown.contains("len: 0"), "{shown}");
        assert!(c.is_empty());
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let c = cache(2);
        c.insert("a".into(), 1);
        c.insert("b".into(), 2);
        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(c.get(&"a".into()), Some(1));
        c.insert("c".into(), 3);

        assert_eq!(c.len(), 2);
        assert_eq!(c.get(&"b".into()), None);
        assert_eq!(c.get(&"a".into()), Some(1));
        assert_eq!(c.get(&"c".into()), Some(3));
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let c = cache(0);
        c.insert("a".into(), 1);
        c.insert("b".into(), 2);
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(&"b".into()), Some(2));
    }

    #[test]
    fn remove_and_clear() {
        let c = cache(4);
        c.insert("a".into(), 1);
        c.insert("b".into(), 2);
        assert_eq!(c.remove(&"a".into()), Some(1));
        assert_eq!(c.remove(&"a".into()), None);
        c.clear();
        assert!(c.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let c = cache(4);
        c.insert_with_ttl("a".into(), 1, Duration::from_secs(1));
        c.insert_with_ttl("b".into(), 2, Duration::from_secs(1));
        c.insert("c".into(), 3);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(c.len(), 3);
        assert_eq!(c.purge_expired(), 2);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn loader_runs_on_miss_only() {
        let c = cache(4);
        let first: Result<u32, String> = c.get_or_try_insert_with("k".into(), || async { Ok(7) }).await;
        assert_eq!(first, Ok(7));

        let second: Result<u32, String> = c
            .get_or_try_insert_with("k".into(), || async { Err("should not load".to_owned()) })
            .await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test]
    async fn loader_errors_are_not_cached() {
        let c = cache(4);
        let err: Result<u32, &str> = c.get_or_try_insert_with("k".into(), || async { Err("down") }).await;
        assert_eq!(err, Err("down"));
        assert!(c.is_empty());
    }
}
