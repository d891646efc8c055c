//! Image loading infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction and TTL expiry
//! - Disk caching for persistence, with timestamp sidecars
//! - Codec and HTTP fetch adapters for the domain ports
//! - Stock transforms
//! - The request-coalescing load engine

pub mod codec;
pub mod disk_cache;
pub mod http_fetcher;
pub mod loader;
pub mod memory_cache;
pub mod transforms;

pub use codec::ImageCrateCodec;
pub use disk_cache::{DiskImageCache, default_cache_dir};
pub use http_fetcher::HttpImageFetcher;
pub use loader::ImageLoader;
pub use memory_cache::MemoryImageCache;
