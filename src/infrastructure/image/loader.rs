//! Request-coalescing image load engine.
//!
//! Resolves a locator through three tiers: Memory -> Disk -> Network.
//!
//! At most one in-flight task exists per locator. Later requests for the same
//! locator join it and receive the same result in one fan-out. Every registry
//! mutation (create, join, complete, cancel) goes through a single mutex that
//! is never held across an await.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::domain::entities::{
    CacheKey, Completion, ImageSource, ImageTransform, LoadedImage, OutputEncoding,
};
use crate::domain::errors::LoadError;
use crate::domain::ports::{
    CacheResult, CacheStats, ImageCachePort, ImageCodecPort, ImageFetchPort,
};
use crate::infrastructure::config::{ConfigHandle, LoaderConfig};
use crate::infrastructure::logging::{log_basic, log_verbose};

use super::codec::ImageCrateCodec;
use super::disk_cache::DiskImageCache;
use super::http_fetcher::HttpImageFetcher;
use super::memory_cache::MemoryImageCache;

/// Pending requests for one locator.
struct InFlightTask {
    id: u64,
    cancel: CancellationToken,
    waiters: Vec<Completion>,
}

type Registry = Arc<Mutex<HashMap<CacheKey, InFlightTask>>>;

/// Orchestrates image loading from memory, disk and network.
///
/// Construct once and share by reference (or `Arc`); all methods take `&self`.
/// `load` must be called from within a tokio runtime.
pub struct ImageLoader {
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<DiskImageCache>,
    fetcher: Arc<dyn ImageFetchPort>,
    codec: Arc<dyn ImageCodecPort>,
    config: ConfigHandle,
    registry: Registry,
    next_task_id: AtomicU64,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config.current())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader over the given disk cache and fetcher.
    ///
    /// The disk cache should share `config` so TTL changes reach it. A memory
    /// cache sized by the config and the `image`-crate codec are created here.
    #[must_use]
    pub fn new(
        config: ConfigHandle,
        disk_cache: Arc<DiskImageCache>,
        fetcher: Arc<dyn ImageFetchPort>,
    ) -> Self {
        let memory_cache = Arc::new(MemoryImageCache::from_config(config.clone()));
        Self {
            memory_cache,
            disk_cache,
            fetcher,
            codec: Arc::new(ImageCrateCodec),
            config,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_task_id: AtomicU64::new(0),
        }
    }

    /// Creates a loader with an HTTP fetcher and a disk cache in the default
    /// location.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub async fn with_defaults(config: LoaderConfig) -> CacheResult<Self> {
        let fetcher = HttpImageFetcher::new(config.timeout())?;
        let config = ConfigHandle::new(config);
        let disk_cache = Arc::new(DiskImageCache::default_location(config.clone()).await);
        Ok(Self::new(config, disk_cache, Arc::new(fetcher)))
    }

    /// Replaces the codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn ImageCodecPort>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the memory cache.
    #[must_use]
    pub fn with_memory_cache(mut self, memory_cache: Arc<MemoryImageCache>) -> Self {
        self.memory_cache = memory_cache;
        self
    }

    /// Returns the current config snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<LoaderConfig> {
        self.config.current()
    }

    /// Replaces the config. Tasks already in flight keep their snapshot.
    pub fn set_config(&self, config: LoaderConfig) {
        self.config.replace(config);
    }

    /// Returns the memory tier.
    #[must_use]
    pub fn memory_cache(&self) -> &Arc<MemoryImageCache> {
        &self.memory_cache
    }

    /// Returns the disk tier.
    #[must_use]
    pub fn disk_cache(&self) -> &Arc<DiskImageCache> {
        &self.disk_cache
    }

    /// Requests an image; `completion` receives the result.
    ///
    /// If a task for the locator is already in flight the completion joins it
    /// and no new work starts, unless `cancel_previous_on_reissue` is set, in
    /// which case the old task is cancelled (its waiters are abandoned) and a
    /// new one replaces it.
    ///
    /// A joined request gets the result of the task it joined, transformed by
    /// that task's transform. The `transform` passed with a joining request is
    /// ignored.
    pub fn load(&self, locator: Url, transform: Option<ImageTransform>, completion: Completion) {
        let config = self.config.current();
        let key = CacheKey::from_locator(&locator);

        let mut registry = self.registry.lock();

        if config.cancel_previous_on_reissue {
            if let Some(previous) = registry.remove(&key) {
                previous.cancel.cancel();
                log_verbose!(config, key = %key, abandoned = previous.waiters.len(), "Cancelled previous load for reissued locator");
            }
        } else if let Some(existing) = registry.get_mut(&key) {
            existing.waiters.push(completion);
            log_verbose!(config, key = %key, waiters = existing.waiters.len(), "Joining existing task");
            return;
        }

        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        registry.insert(
            key.clone(),
            InFlightTask {
                id,
                cancel: cancel.clone(),
                waiters: vec![completion],
            },
        );
        let in_flight = registry.len();
        drop(registry);

        log_basic!(config, info, url = %locator, "Starting image load");
        log_verbose!(config, key = %key, task = id, in_flight, "Registered in-flight task");

        let task = LoadTask {
            id,
            key,
            locator,
            transform,
            cancel,
            config,
            memory_cache: self.memory_cache.clone(),
            disk_cache: self.disk_cache.clone(),
            fetcher: self.fetcher.clone(),
            codec: self.codec.clone(),
            registry: self.registry.clone(),
        };

        tokio::spawn(task.run());
    }

    /// Loads an image and waits for the result.
    ///
    /// Returns `None` on any failure, and also when the task is cancelled and
    /// abandoned before producing a result.
    pub async fn load_async(
        &self,
        locator: Url,
        transform: Option<ImageTransform>,
    ) -> Option<LoadedImage> {
        let (tx, rx) = oneshot::channel();
        self.load(
            locator,
            transform,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.ok().flatten()
    }

    /// Starts loading images into the caches without waiting for them.
    pub fn prefetch_batch(&self, locators: impl IntoIterator<Item = Url>) {
        for locator in locators {
            self.load(locator, None, Box::new(|_| {}));
        }
    }

    /// Cancels the in-flight task for a locator.
    ///
    /// The registry entry is removed immediately, so a later `load` starts a
    /// new task. Waiters of the cancelled task receive no callback. Returns
    /// whether a task was cancelled.
    pub fn cancel_load(&self, locator: &Url) -> bool {
        let key = CacheKey::from_locator(locator);
        let removed = self.registry.lock().remove(&key);

        let Some(task) = removed else {
            return false;
        };
        task.cancel.cancel();

        let config = self.config.current();
        log_verbose!(config, key = %key, abandoned = task.waiters.len(), "Cancelling task");
        true
    }

    /// Cancels every in-flight task if `enable_global_cancel` is set.
    /// Returns the number of tasks cancelled.
    pub fn cancel_all(&self) -> usize {
        let config = self.config.current();
        if !config.enable_global_cancel {
            log_verbose!(config, "Global cancel disabled, ignoring cancel_all");
            return 0;
        }

        let drained: Vec<InFlightTask> = self
            .registry
            .lock()
            .drain()
            .map(|(_, task)| task)
            .collect();

        for task in &drained {
            task.cancel.cancel();
        }

        if !drained.is_empty() {
            log_verbose!(config, count = drained.len(), "Cancelled all ongoing image loads");
        }
        drained.len()
    }

    /// Returns true if a task for the locator is in flight.
    #[must_use]
    pub fn is_loading(&self, locator: &Url) -> bool {
        self.registry
            .lock()
            .contains_key(&CacheKey::from_locator(locator))
    }

    /// Returns the number of in-flight tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_cache_stats(&self) -> CacheStats {
        self.memory_cache.stats()
    }

    /// Returns disk cache read statistics.
    #[must_use]
    pub fn disk_cache_stats(&self) -> CacheStats {
        self.disk_cache.stats()
    }

    /// Clears both cache tiers.
    pub async fn clear_all(&self) {
        self.memory_cache.clear().await;
        self.disk_cache.clear().await;
        log_basic!(self.config.current(), info, "Cleared all image caches");
    }
}

/// Execution unit for one in-flight task.
struct LoadTask {
    id: u64,
    key: CacheKey,
    locator: Url,
    transform: Option<ImageTransform>,
    cancel: CancellationToken,
    config: Arc<LoaderConfig>,
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<DiskImageCache>,
    fetcher: Arc<dyn ImageFetchPort>,
    codec: Arc<dyn ImageCodecPort>,
    registry: Registry,
}

impl LoadTask {
    async fn run(self) {
        let result = match self.resolve().await {
            Ok(loaded) => Some(loaded),
            Err(LoadError::Cancelled) => {
                log_verbose!(self.config, url = %self.locator, "Cancelled image load");
                None
            }
            Err(e @ LoadError::Decode(_)) => {
                log_basic!(self.config, warn, url = %self.locator, error = %e, "Failed to decode image");
                None
            }
            Err(e) => {
                log_basic!(self.config, warn, url = %self.locator, error = %e, "Error loading image");
                None
            }
        };

        self.deliver(result);
    }

    async fn resolve(&self) -> Result<LoadedImage, LoadError> {
        if let Some(bytes) = self.memory_cache.get(&self.key).await {
            self.ensure_active()?;
            let image = match self.decode(bytes).await {
                Ok(image) => image,
                Err(e) => {
                    self.memory_cache.evict(&self.key).await;
                    return Err(e);
                }
            };
            log_basic!(self.config, info, url = %self.locator, "Loaded from memory cache");
            return Ok(self.loaded(image, ImageSource::MemoryCache));
        }

        self.ensure_active()?;
        if let Some(bytes) = self.disk_cache.get_bytes(&self.key).await {
            self.ensure_active()?;
            match self.decode(bytes.clone()).await {
                Ok(image) => {
                    self.memory_cache.put(self.key.clone(), bytes).await;
                    log_basic!(self.config, info, url = %self.locator, "Loaded from disk cache");
                    return Ok(self.loaded(image, ImageSource::DiskCache));
                }
                Err(LoadError::Decode(e)) => {
                    log_basic!(self.config, warn, url = %self.locator, error = %e, "Discarding undecodable disk cache entry");
                    self.disk_cache.evict(&self.key).await;
                }
                Err(e) => return Err(e),
            }
        }

        self.ensure_active()?;
        let bytes = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(LoadError::Cancelled),
            result = self.fetcher.fetch(&self.locator) => result?,
        };

        self.ensure_active()?;
        let (image, encoded) = self
            .decode_for_cache(bytes, self.config.output_encoding)
            .await?;

        match encoded {
            Ok(encoded) => {
                let encoded = Bytes::from(encoded);
                self.memory_cache.put(self.key.clone(), encoded.clone()).await;
                self.disk_cache.put(self.key.clone(), encoded).await;
            }
            Err(e) => {
                log_basic!(self.config, warn, url = %self.locator, error = %e, "Skipping cache write-through");
            }
        }

        log_basic!(self.config, info, url = %self.locator, "Downloaded from network");
        Ok(self.loaded(image, ImageSource::Network))
    }

    fn ensure_active(&self) -> Result<(), LoadError> {
        if self.cancel.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn loaded(&self, image: image::DynamicImage, source: ImageSource) -> LoadedImage {
        LoadedImage {
            key: self.key.clone(),
            image: Arc::new(image),
            source,
        }
    }

    /// Decodes cached bytes and applies the transform.
    async fn decode(&self, bytes: Bytes) -> Result<image::DynamicImage, LoadError> {
        let codec = self.codec.clone();
        let transform = self.transform.clone();

        tokio::task::spawn_blocking(move || -> Result<image::DynamicImage, LoadError> {
            let image = codec.decode(&bytes)?;
            Ok(apply(transform.as_ref(), image))
        })
        .await
        .map_err(|e| LoadError::decode(format!("Decode task panicked: {e}")))?
    }

    /// Decodes fetched bytes, encodes the untransformed image for the caches,
    /// then applies the transform.
    async fn decode_for_cache(
        &self,
        bytes: Bytes,
        encoding: OutputEncoding,
    ) -> Result<(image::DynamicImage, Result<Vec<u8>, LoadError>), LoadError> {
        let codec = self.codec.clone();
        let transform = self.transform.clone();

        tokio::task::spawn_blocking(move || -> Result<(image::DynamicImage, Result<Vec<u8>, LoadError>), LoadError> {
            let image = codec.decode(&bytes)?;
            let encoded = codec.encode(&image, encoding);
            Ok((apply(transform.as_ref(), image), encoded))
        })
        .await
        .map_err(|e| LoadError::decode(format!("Decode task panicked: {e}")))?
    }

    /// Retires the task and fans the result out to every waiter in
    /// registration order. A task that was cancelled or replaced no longer
    /// owns its registry entry and delivers nothing.
    fn deliver(self, result: Option<LoadedImage>) {
        let waiters = {
            let mut registry = self.registry.lock();
            match registry.get(&self.key) {
                Some(task) if task.id == self.id => {
                    registry.remove(&self.key).map(|task| task.waiters)
                }
                _ => None,
            }
        };

        let Some(waiters) = waiters else {
            log_verbose!(self.config, key = %self.key, task = self.id, "Dropping result of abandoned task");
            return;
        };

        log_verbose!(self.config, key = %self.key, waiters = waiters.len(), "Delivering result");
        for waiter in waiters {
            waiter(result.clone());
        }
    }
}

fn apply(transform: Option<&ImageTransform>, image: image::DynamicImage) -> image::DynamicImage {
    match transform {
        Some(transform) => transform(image),
        None => image,
    }
}
