//! Port definition for image decoding and encoding.

use crate::domain::entities::OutputEncoding;
use crate::domain::errors::LoadError;

/// Opaque decode/encode capability.
///
/// Both operations are synchronous CPU work; callers run them off the async
/// executor.
pub trait ImageCodecPort: Send + Sync {
    /// Decodes bytes into an image.
    ///
    /// # Errors
    /// Returns `LoadError::Decode` if the bytes are not a supported image.
    fn decode(&self, bytes: &[u8]) -> Result<image::DynamicImage, LoadError>;

    /// Encodes an image with the given output encoding.
    ///
    /// # Errors
    /// Returns `LoadError::Decode` if the encoder rejects the image.
    fn encode(
        &self,
        image: &image::DynamicImage,
        encoding: OutputEncoding,
    ) -> Result<Vec<u8>, LoadError>;
}
