//! Domain types for image loading.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

/// Cache and registry index derived from a locator.
///
/// The key is the locator's canonical string form, so the same locator always
/// maps to the same key in both cache tiers and in the in-flight registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a new `CacheKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the key for a locator.
    #[must_use]
    pub fn from_locator(locator: &Url) -> Self {
        Self(locator.as_str().to_owned())
    }

    /// Returns a fixed-length, filesystem-safe name for this key.
    ///
    /// Truncated SHA-256 of the canonical string, hex encoded (32 chars).
    #[must_use]
    pub fn file_stem(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&Url> for CacheKey {
    fn from(locator: &Url) -> Self {
        Self::from_locator(locator)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Encoding used when a decoded image is written back into the caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    /// Lossless PNG.
    #[default]
    Png,
    /// JPEG with the given quality (1-100).
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
}

impl OutputEncoding {
    /// Returns the conventional file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }
}

impl std::fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg { quality } => write!(f, "jpeg({quality})"),
        }
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from the in-memory cache.
    MemoryCache,
    /// Loaded from the disk cache.
    DiskCache,
    /// Downloaded from the network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A decoded image delivered to every waiter of a load.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The key the image was loaded under.
    pub key: CacheKey,
    /// The decoded (and transformed) image.
    pub image: Arc<image::DynamicImage>,
    /// Which tier produced the bytes.
    pub source: ImageSource,
}

impl LoadedImage {
    /// Returns the image dimensions as `(width, height)`.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Caller-supplied pure transform applied once per successful decode.
pub type ImageTransform = Arc<dyn Fn(image::DynamicImage) -> image::DynamicImage + Send + Sync>;

/// Completion callback receiving the final result of a load.
pub type Completion = Box<dyn FnOnce(Option<LoadedImage>) + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_locator() {
        let url = Url::parse("https://example.com/a/b.png?x=1").unwrap();
        let key = CacheKey::from_locator(&url);
        assert_eq!(key.as_str(), "https://example.com/a/b.png?x=1");
    }

    #[test]
    fn test_key_consistency() {
        let a = Url::parse("HTTPS://Example.com/img.png").unwrap();
        let b = Url::parse("https://example.com/img.png").unwrap();
        assert_eq!(CacheKey::from(&a), CacheKey::from(&b));
    }

    #[test]
    fn test_file_stem_is_fixed_length_and_safe() {
        let key = CacheKey::new("https://example.com/some path/ü.png?q=a&b=c");
        let stem = key.file_stem();
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_file_stem_distinguishes_keys() {
        let a = CacheKey::new("https://example.com/a?x=%20");
        let b = CacheKey::new("https://example.com/a?x= ");
        assert_ne!(a.file_stem(), b.file_stem());
    }

    #[test]
    fn test_output_encoding_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            encoding: OutputEncoding,
        }

        let png: Wrapper = toml::from_str(r#"encoding = "png""#).unwrap();
        assert_eq!(png.encoding, OutputEncoding::Png);

        let jpeg: Wrapper = toml::from_str("encoding = { jpeg = { quality = 80 } }").unwrap();
        assert_eq!(jpeg.encoding, OutputEncoding::Jpeg { quality: 80 });
    }
}
