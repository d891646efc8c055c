//! `image`-crate implementation of the codec port.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::domain::entities::OutputEncoding;
use crate::domain::errors::LoadError;
use crate::domain::ports::ImageCodecPort;

/// Decodes any format the `image` crate was built with (PNG, JPEG, WebP)
/// and encodes to PNG or JPEG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCodecPort for ImageCrateCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, LoadError> {
        image::load_from_memory(bytes).map_err(|e| LoadError::decode(format!("Failed to decode image: {e}")))
    }

    fn encode(&self, image: &DynamicImage, encoding: OutputEncoding) -> Result<Vec<u8>, LoadError> {
        let mut out = Cursor::new(Vec::new());
        match encoding {
            OutputEncoding::Png => image
                .write_to(&mut out, ImageFormat::Png)
                .map_err(|e| LoadError::decode(format!("Failed to encode PNG: {e}")))?,
            OutputEncoding::Jpeg { quality } => {
                // JPEG has no alpha channel.
                let rgb = image.to_rgb8();
                let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)
                    .map_err(|e| LoadError::decode(format!("Failed to encode JPEG: {e}")))?;
            }
        }
        Ok(out.into_inner())
    }
}
