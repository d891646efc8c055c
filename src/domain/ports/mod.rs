mod codec_port;
mod fetch_port;
mod image_cache_port;

pub use codec_port::ImageCodecPort;
pub use fetch_port::ImageFetchPort;
pub use image_cache_port::{CacheResult, CacheStats, ImageCachePort};

#[cfg(test)]
pub use fetch_port::MockImageFetchPort;
