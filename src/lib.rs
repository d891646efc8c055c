//! pixcache - a request-coalescing image loader.
//!
//! Loads images by locator through an in-memory LRU cache, a persistent disk
//! cache and finally the network, merging concurrent requests for the same
//! locator into one task whose result is delivered to every waiter.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing cache tiers, adapters and configuration.
pub mod infrastructure;

pub use domain::{CacheKey, ImageSource, LoadError, LoadedImage, OutputEncoding};
pub use infrastructure::{ConfigHandle, ImageLoader, LoaderConfig, LogVerbosity};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixcache";
