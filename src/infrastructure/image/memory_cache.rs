//! In-memory LRU cache of encoded image bytes.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::entities::CacheKey;
use crate::domain::ports::{CacheStats, ImageCachePort};
use crate::infrastructure::config::ConfigHandle;

/// Default maximum number of entries to cache in memory.
pub const DEFAULT_CACHE_SIZE: usize = 50;

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Bytes,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.stored_at.elapsed() > ttl)
    }
}

/// Capacity-bounded LRU cache with optional per-entry TTL.
/// Thread-safe and shared by every load task.
pub struct MemoryImageCache {
    cache: Arc<RwLock<LruCache<CacheKey, CacheEntry>>>,
    config: ConfigHandle,
    entries: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache with the specified capacity.
    #[must_use]
    pub fn new(capacity: usize, config: ConfigHandle) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(cap))),
            config,
            entries: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a cache sized by the current config.
    #[must_use]
    pub fn from_config(config: ConfigHandle) -> Self {
        let capacity = config.current().memory_cache_size;
        Self::new(capacity, config)
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.len(),
        )
    }

    /// Peeks at an entry without promoting it in the LRU.
    /// Expired entries read as absent but are left for the next `get` to purge.
    pub async fn peek(&self, key: &CacheKey) -> Option<Bytes> {
        let ttl = self.config.current().memory_ttl();
        let cache = self.cache.read().await;
        cache
            .peek(key)
            .filter(|entry| !entry.is_expired(ttl))
            .map(|entry| entry.payload.clone())
    }

    /// Returns true if the key is stored, expired or not.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.cache.read().await.contains(key)
    }
}

impl std::fmt::Debug for MemoryImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ImageCachePort for MemoryImageCache {
    async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let ttl = self.config.current().memory_ttl();
        let mut cache = self.cache.write().await;

        let Some(entry) = cache.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            return None;
        };

        if entry.is_expired(ttl) {
            cache.pop(key);
            self.entries.store(cache.len(), Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Purged expired entry from memory cache");
            return None;
        }

        let payload = entry.payload.clone();
        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!(key = %key, "Memory cache hit");
        Some(payload)
    }

    async fn put(&self, key: CacheKey, bytes: Bytes) {
        let mut cache = self.cache.write().await;
        debug!(key = %key, size = bytes.len(), "Storing image in memory cache");
        let entry = CacheEntry {
            payload: bytes,
            stored_at: Instant::now(),
        };
        if let Some((evicted, _)) = cache.push(key.clone(), entry)
            && evicted != key
        {
            trace!(key = %evicted, "Memory cache evicted entry");
        }
        self.entries.store(cache.len(), Ordering::Relaxed);
    }

    async fn evict(&self, key: &CacheKey) {
        let mut cache = self.cache.write().await;
        if cache.pop(key).is_some() {
            self.entries.store(cache.len(), Ordering::Relaxed);
            debug!(key = %key, "Evicted image from memory cache");
        }
    }

    fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
        self.entries.store(0, Ordering::Relaxed);
        debug!("Cleared memory image cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::LoaderConfig;

    fn cache_with(capacity: usize, memory_ttl_secs: Option<u64>) -> MemoryImageCache {
        let config = ConfigHandle::new(LoaderConfig {
            memory_ttl_secs,
            ..LoaderConfig::default()
        });
        MemoryImageCache::new(capacity, config)
    }

    #[tokio::test]
    async fn test_cache_put_and_get() {
        let cache = cache_with(10, None);
        let key = CacheKey::new("test1");

        cache.put(key.clone(), Bytes::from_static(b"payload")).await;
        let retrieved = cache.get(&key).await;

        assert_eq!(retrieved.as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = cache_with(10, None);
        assert!(cache.get(&CacheKey::new("nonexistent")).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_eviction() {
        let cache = cache_with(2, None);

        let key1 = CacheKey::new("test1");
        let key2 = CacheKey::new("test2");
        let key3 = CacheKey::new("test3");
        let bytes = Bytes::from_static(b"x");

        cache.put(key1.clone(), bytes.clone()).await;
        cache.put(key2.clone(), bytes.clone()).await;
        cache.put(key3.clone(), bytes).await;

        // key1 should be evicted (LRU)
        assert!(cache.get(&key1).await.is_none());
        assert!(cache.get(&key2).await.is_some());
        assert!(cache.get(&key3).await.is_some());
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = cache_with(10, None);
        let key = CacheKey::new("test1");

        cache.put(key.clone(), Bytes::from_static(b"x")).await;

        let _ = cache.get(&key).await;
        let _ = cache.get(&CacheKey::new("missing")).await;

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_purged() {
        let cache = cache_with(10, Some(10));
        let key = CacheKey::new("ttl");

        cache.put(key.clone(), Bytes::from_static(b"x")).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.get(&key).await.is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(&key).await.is_none());
        assert!(!cache.contains(&key).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ttl_never_expires() {
        let cache = cache_with(10, None);
        let key = CacheKey::new("forever");

        cache.put(key.clone(), Bytes::from_static(b"x")).await;
        tokio::time::advance(Duration::from_secs(60 * 60 * 24)).await;

        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_hides_expired_without_purging() {
        let cache = cache_with(10, Some(1));
        let key = CacheKey::new("peek");

        cache.put(key.clone(), Bytes::from_static(b"x")).await;
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(cache.peek(&key).await.is_none());
        assert!(cache.contains(&key).await);
    }

    #[tokio::test]
    async fn test_peek_does_not_promote() {
        let cache = cache_with(2, None);

        let key1 = CacheKey::new("test1");
        let key2 = CacheKey::new("test2");
        let bytes = Bytes::from_static(b"x");

        cache.put(key1.clone(), bytes.clone()).await;
        cache.put(key2.clone(), bytes.clone()).await;

        let _ = cache.peek(&key1).await;

        cache.put(CacheKey::new("test3"), bytes).await;

        assert!(cache.peek(&key1).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_len_tracks_entries_while_locked() {
        let config = ConfigHandle::new(LoaderConfig {
            memory_ttl_secs: Some(5),
            ..LoaderConfig::default()
        });
        let cache = MemoryImageCache::new(2, config);
        let bytes = Bytes::from_static(b"x");

        cache.put(CacheKey::new("a"), bytes.clone()).await;
        cache.put(CacheKey::new("b"), bytes.clone()).await;
        cache.put(CacheKey::new("c"), bytes).await;
        assert_eq!(cache.len(), 2);

        {
            let _writer = cache.cache.write().await;
            assert_eq!(cache.len(), 2);
            assert!(!cache.is_empty());
        }
        assert_eq!(cache.stats().size, 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get(&CacheKey::new("c")).await.is_none());
        assert_eq!(cache.len(), 1);

        cache.evict(&CacheKey::new("b")).await;
        assert!(cache.is_empty());
    }
}
