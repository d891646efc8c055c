//! Disk-based image cache for persistence across sessions.
//!
//! Each entry is a `<hash>.img` payload plus an optional `<hash>.meta` sidecar
//! holding the store time in unix milliseconds. A missing sidecar means the
//! entry's age is not tracked, so it never expires by TTL.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::LoadError;
use crate::domain::ports::{CacheResult, CacheStats, ImageCachePort};
use crate::infrastructure::config::ConfigHandle;

/// Maximum disk cache size in bytes (200 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 200 * 1024 * 1024;

const PAYLOAD_EXT: &str = "img";
const SIDECAR_EXT: &str = "meta";

/// Disk-based cache that persists encoded image bytes.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    max_size: u64,
    config: ConfigHandle,
    /// Serializes every file mutation with its counter update.
    write_lock: Mutex<()>,
    current_size: AtomicU64,
    item_count: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiskImageCache {
    /// Opens a disk cache in the specified directory.
    ///
    /// The directory is created if absent. Failing to create or scan it is
    /// not fatal: the cache then behaves as empty and retries creation on the
    /// next write.
    pub async fn new(cache_dir: PathBuf, max_size: u64, config: ConfigHandle) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir).await {
            warn!(path = %cache_dir.display(), error = %e, "Failed to create cache dir");
        }

        let (total_size, count) = scan_payloads(&cache_dir).await;

        let cache = Self {
            cache_dir,
            max_size,
            config,
            write_lock: Mutex::new(()),
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(count),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };

        cache.cleanup_if_needed().await;

        cache
    }

    /// Opens a cache in the platform cache location (`<cache dir>/images`),
    /// sized by the current config.
    pub async fn default_location(config: ConfigHandle) -> Self {
        let max_size = config.current().disk_cache_size;
        Self::new(default_cache_dir(), max_size, config).await
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn payload_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{PAYLOAD_EXT}", key.file_stem()))
    }

    fn sidecar_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{SIDECAR_EXT}", key.file_stem()))
    }

    /// Gets raw bytes from the disk cache.
    ///
    /// An entry whose sidecar is older than the disk TTL is deleted (payload
    /// and sidecar) and reported as a miss. Read errors are reported as misses.
    pub async fn get_bytes(&self, key: &CacheKey) -> Option<Bytes> {
        let path = self.payload_path(key);

        if let Some(ttl) = self.config.current().disk_ttl()
            && let Some(stored_at) = read_timestamp(&self.sidecar_path(key)).await
            && is_expired(stored_at, ttl)
        {
            self.remove_entry(key).await;
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Purged expired entry from disk cache");
            return None;
        }

        match fs::read(&path).await {
            Ok(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                Some(Bytes::from(bytes))
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                if e.kind() == std::io::ErrorKind::NotFound {
                    trace!(key = %key, "Disk cache miss");
                } else {
                    warn!(key = %key, error = %e, "Failed to read disk cache entry");
                }
                None
            }
        }
    }

    /// Stores raw bytes in the disk cache, stamped with the current time.
    ///
    /// # Errors
    /// Returns `LoadError::Storage` if the directory or files cannot be written.
    pub async fn put_bytes(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<()> {
        self.write_entry(key, bytes, Utc::now()).await
    }

    pub(crate) async fn write_entry(
        &self,
        key: &CacheKey,
        bytes: &[u8],
        stored_at: DateTime<Utc>,
    ) -> CacheResult<()> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| LoadError::storage(format!("Failed to create cache dir: {e}")))?;

        let path = self.payload_path(key);
        let guard = self.write_lock.lock().await;
        let old_size = fs::metadata(&path).await.map(|m| m.len()).ok();

        write_file(&path, bytes).await?;
        write_file(
            &self.sidecar_path(key),
            stored_at.timestamp_millis().to_string().as_bytes(),
        )
        .await?;

        let new_size = bytes.len() as u64;
        if let Some(old) = old_size {
            if new_size > old {
                self.current_size
                    .fetch_add(new_size - old, Ordering::Relaxed);
            } else {
                self.current_size
                    .fetch_sub(old - new_size, Ordering::Relaxed);
            }
        } else {
            self.current_size.fetch_add(new_size, Ordering::Relaxed);
            self.item_count.fetch_add(1, Ordering::Relaxed);
        }
        drop(guard);

        debug!(key = %key, path = %path.display(), size = bytes.len(), "Stored image in disk cache");

        self.cleanup_if_needed().await;

        Ok(())
    }

    /// Removes payload and sidecar, keeping the counters in sync.
    async fn remove_entry(&self, key: &CacheKey) -> bool {
        let path = self.payload_path(key);
        let _guard = self.write_lock.lock().await;
        let size = fs::metadata(&path).await.map(|m| m.len()).ok();

        let _ = fs::remove_file(self.sidecar_path(key)).await;

        match fs::remove_file(&path).await {
            Ok(()) => {
                if let Some(s) = size {
                    self.current_size.fetch_sub(s, Ordering::Relaxed);
                    self.item_count.fetch_sub(1, Ordering::Relaxed);
                }
                true
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key = %key, error = %e, "Failed to remove disk cache entry");
                }
                false
            }
        }
    }

    /// Deletes every payload and sidecar in the cache directory.
    ///
    /// # Errors
    /// Returns `LoadError::Storage` if the cache directory cannot be read.
    pub async fn remove_all(&self) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| LoadError::storage(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LoadError::storage(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext == PAYLOAD_EXT || ext == SIDECAR_EXT)
                && fs::remove_file(&path).await.is_err()
            {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        self.current_size.store(0, Ordering::Relaxed);
        self.item_count.store(0, Ordering::Relaxed);
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns read statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.len(),
        )
    }

    /// Checks if a payload is stored for the key.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        fs::try_exists(self.payload_path(key)).await.unwrap_or(false)
    }

    /// Cleans up least recently accessed entries if over the size limit.
    async fn cleanup_if_needed(&self) {
        let _guard = self.write_lock.lock().await;
        let current_size = self.current_size();
        if current_size <= self.max_size {
            return;
        }

        debug!(
            current_size = current_size,
            max_size = self.max_size,
            "Disk cache over limit, cleaning up"
        );

        let Ok(mut entries) = fs::read_dir(&self.cache_dir).await else {
            return;
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime, u64)> = Vec::new();

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != PAYLOAD_EXT) {
                continue;
            }

            if let Ok(meta) = entry.metadata().await {
                let accessed = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, accessed, meta.len()));
            }
        }

        files.sort_by_key(|(_, time, _)| *time);

        let mut freed_size = 0u64;
        let mut freed_count = 0usize;
        let target = current_size - self.max_size + (self.max_size / 10);

        for (path, _, size) in files {
            if freed_size >= target {
                break;
            }

            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove old cache file");
            } else {
                let _ = fs::remove_file(path.with_extension(SIDECAR_EXT)).await;
                debug!(path = %path.display(), "Removed old cache file");
                freed_size += size;
                freed_count += 1;
            }
        }
        self.current_size.fetch_sub(freed_size, Ordering::Relaxed);
        self.item_count.fetch_sub(freed_count, Ordering::Relaxed);

        debug!(
            freed_size = freed_size,
            freed_count = freed_count,
            "Disk cache cleanup complete"
        );
    }
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.cache_dir)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ImageCachePort for DiskImageCache {
    async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        self.get_bytes(key).await
    }

    async fn put(&self, key: CacheKey, bytes: Bytes) {
        if let Err(e) = self.put_bytes(&key, &bytes).await {
            warn!(key = %key, error = %e, "Failed to cache to disk");
        }
    }

    async fn evict(&self, key: &CacheKey) {
        if self.remove_entry(key).await {
            debug!(key = %key, "Evicted from disk cache");
        }
    }

    fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    async fn clear(&self) {
        if let Err(e) = self.remove_all().await {
            warn!(error = %e, "Failed to clear disk cache");
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| LoadError::storage(format!("Failed to create cache file: {e}")))?;

    file.write_all(bytes)
        .await
        .map_err(|e| LoadError::storage(format!("Failed to write cache file: {e}")))?;

    file.flush()
        .await
        .map_err(|e| LoadError::storage(format!("Failed to flush cache file: {e}")))
}

async fn scan_payloads(dir: &Path) -> (u64, usize) {
    let mut total_size = 0u64;
    let mut count = 0usize;

    let Ok(mut entries) = fs::read_dir(dir).await else {
        return (total_size, count);
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == PAYLOAD_EXT)
            && let Ok(meta) = entry.metadata().await
        {
            total_size += meta.len();
            count += 1;
        }
    }

    (total_size, count)
}

async fn read_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let content = fs::read_to_string(path).await.ok()?;
    let millis = content.trim().parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis)
}

fn is_expired(stored_at: DateTime<Utc>, ttl: Duration) -> bool {
    Utc::now()
        .signed_duration_since(stored_at)
        .to_std()
        .is_ok_and(|age| age > ttl)
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "pixcache").map_or_else(
        || {
            std::env::temp_dir()
                .join("pixcache")
                .join("cache")
                .join("images")
        },
        |dirs| dirs.cache_dir().join("images"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::LoaderConfig;
    use tempfile::TempDir;

    async fn create_test_cache(disk_ttl_secs: Option<u64>) -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigHandle::new(LoaderConfig {
            disk_ttl_secs,
            ..LoaderConfig::default()
        });
        let cache = DiskImageCache::new(temp_dir.path().to_path_buf(), 1024 * 1024, config).await;
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get_bytes() {
        let (cache, _temp) = create_test_cache(None).await;
        let key = CacheKey::new("https://example.com/a.png");

        cache.put_bytes(&key, b"test image data").await.unwrap();
        let retrieved = cache.get_bytes(&key).await;

        assert_eq!(retrieved.as_deref(), Some(&b"test image data"[..]));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache(None).await;
        assert!(cache.get_bytes(&CacheKey::new("nonexistent")).await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_writes_hashed_payload_and_sidecar() {
        let (cache, temp) = create_test_cache(None).await;
        let key = CacheKey::new("https://example.com/a b/c.png?x=1");

        cache.put_bytes(&key, b"data").await.unwrap();

        let stem = key.file_stem();
        assert!(temp.path().join(format!("{stem}.img")).exists());
        let stamp = std::fs::read_to_string(temp.path().join(format!("{stem}.meta"))).unwrap();
        assert!(stamp.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_expired_entry_is_deleted() {
        let (cache, temp) = create_test_cache(Some(60)).await;
        let key = CacheKey::new("old");

        let stored_at = Utc::now() - chrono::TimeDelta::seconds(120);
        cache.write_entry(&key, b"stale", stored_at).await.unwrap();

        assert!(cache.get_bytes(&key).await.is_none());

        let stem = key.file_stem();
        assert!(!temp.path().join(format!("{stem}.img")).exists());
        assert!(!temp.path().join(format!("{stem}.meta")).exists());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_fresh_entry_survives_ttl_check() {
        let (cache, _temp) = create_test_cache(Some(60)).await;
        let key = CacheKey::new("fresh");

        cache.put_bytes(&key, b"fresh").await.unwrap();

        assert!(cache.get_bytes(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_missing_sidecar_means_no_expiry() {
        let (cache, temp) = create_test_cache(Some(1)).await;
        let key = CacheKey::new("untracked");

        let stored_at = Utc::now() - chrono::TimeDelta::seconds(120);
        cache.write_entry(&key, b"data", stored_at).await.unwrap();
        std::fs::remove_file(temp.path().join(format!("{}.meta", key.file_stem()))).unwrap();

        assert!(cache.get_bytes(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_ttl_ignored_when_unset() {
        let (cache, _temp) = create_test_cache(None).await;
        let key = CacheKey::new("no-ttl");

        let stored_at = Utc::now() - chrono::TimeDelta::days(365);
        cache.write_entry(&key, b"data", stored_at).await.unwrap();

        assert!(cache.get_bytes(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key = CacheKey::new("persisted");
        {
            let cache = DiskImageCache::new(
                temp_dir.path().to_path_buf(),
                1024,
                ConfigHandle::default(),
            )
            .await;
            cache.put_bytes(&key, b"keep").await.unwrap();
        }

        let reopened =
            DiskImageCache::new(temp_dir.path().to_path_buf(), 1024, ConfigHandle::default())
                .await;
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.current_size(), 4);
        assert_eq!(reopened.get_bytes(&key).await.as_deref(), Some(&b"keep"[..]));
    }

    #[tokio::test]
    async fn test_directory_created_on_write() {
        let temp_dir = TempDir::new().unwrap();
        let cache_dir = temp_dir.path().join("nested").join("images");
        let cache = DiskImageCache::new(cache_dir.clone(), 1024, ConfigHandle::default()).await;

        std::fs::remove_dir_all(&cache_dir).unwrap();
        assert!(cache.get_bytes(&CacheKey::new("k")).await.is_none());

        cache.put(CacheKey::new("k"), Bytes::from_static(b"v")).await;
        assert!(cache_dir.exists());
        assert!(cache.contains(&CacheKey::new("k")).await);
    }

    #[tokio::test]
    async fn test_evict() {
        let (cache, _temp) = create_test_cache(None).await;
        let key = CacheKey::new("test1");

        cache.put_bytes(&key, b"test").await.unwrap();
        assert!(cache.contains(&key).await);

        cache.evict(&key).await;
        assert!(!cache.contains(&key).await);
    }

    #[tokio::test]
    async fn test_counters_sync() {
        let (cache, _temp) = create_test_cache(None).await;

        cache.put_bytes(&CacheKey::new("test1"), b"hello").await.unwrap();
        cache.put_bytes(&CacheKey::new("test2"), b"world!").await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 11);

        cache.put_bytes(&CacheKey::new("test1"), b"hey").await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 9);

        cache.evict(&CacheKey::new("test2")).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 3);

        cache.clear().await;
        assert!(cache.is_empty());
        assert_eq!(cache.current_size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_of_one_key_count_once() {
        let (cache, temp) = create_test_cache(None).await;
        let cache = std::sync::Arc::new(cache);
        let key = CacheKey::new("https://example.com/shared.png");

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                tokio::spawn(async move { cache.put_bytes(&key, &[0u8; 1000]).await })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 1000);

        cache.evict(&key).await;
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.current_size(), 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_updates_counters() {
        let temp_dir = TempDir::new().unwrap();
        let cache =
            DiskImageCache::new(temp_dir.path().to_path_buf(), 10, ConfigHandle::default()).await;

        cache.put_bytes(&CacheKey::new("test1"), b"123456").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        cache.put_bytes(&CacheKey::new("test2"), b"123456").await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 6);
    }
}
