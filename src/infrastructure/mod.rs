//! Infrastructure layer with cache tiers, adapters and configuration.

/// Application configuration.
pub mod config;
/// Image caching, loading and transforms.
pub mod image;
pub(crate) mod logging;

pub use config::{AppConfig, CliArgs, ConfigHandle, LoaderConfig, LogVerbosity, StorageManager};
pub use image::{
    DiskImageCache, HttpImageFetcher, ImageCrateCodec, ImageLoader, MemoryImageCache,
    transforms,
};
