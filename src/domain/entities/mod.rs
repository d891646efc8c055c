//! Domain entity definitions.

mod image;

pub use image::{CacheKey, Completion, ImageSource, ImageTransform, LoadedImage, OutputEncoding};
