//! Stock image transforms.
//!
//! Each constructor returns an `ImageTransform` suitable for passing to
//! `ImageLoader::load`.

use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, Rgba};

use crate::domain::entities::ImageTransform;

/// Resizes to exactly `width` x `height`, ignoring aspect ratio.
#[must_use]
pub fn resize(width: u32, height: u32) -> ImageTransform {
    Arc::new(move |img: DynamicImage| {
        if width == 0 || height == 0 {
            return img;
        }
        img.resize_exact(width, height, FilterType::Lanczos3)
    })
}

/// Converts to grayscale, keeping the alpha channel.
#[must_use]
pub fn grayscale() -> ImageTransform {
    Arc::new(|img: DynamicImage| DynamicImage::ImageLumaA8(img.to_luma_alpha8()))
}

/// Crops to the centered square and clears every pixel outside its
/// inscribed circle.
#[must_use]
pub fn circular() -> ImageTransform {
    Arc::new(|img: DynamicImage| {
        let edge = img.width().min(img.height());
        if edge == 0 {
            return img;
        }
        let x = (img.width() - edge) / 2;
        let y = (img.height() - edge) / 2;
        let mut square = img.crop_imm(x, y, edge, edge).to_rgba8();

        let radius = f64::from(edge) / 2.0;
        for (px, py, pixel) in square.enumerate_pixels_mut() {
            let dx = f64::from(px) + 0.5 - radius;
            let dy = f64::from(py) + 0.5 - radius;
            if dx.mul_add(dx, dy * dy) > radius * radius {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }
        DynamicImage::ImageRgba8(square)
    })
}

/// Applies transforms left to right.
#[must_use]
pub fn chain(transforms: Vec<ImageTransform>) -> ImageTransform {
    Arc::new(move |img: DynamicImage| transforms.iter().fold(img, |acc, t| t(acc)))
}
