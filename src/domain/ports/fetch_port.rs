//! Port definition for fetching image bytes over the network.

use bytes::Bytes;
use url::Url;

use crate::domain::errors::LoadError;

/// Network collaborator used on a double cache miss.
///
/// Implementations fail with `LoadError::Cancelled` when they observe
/// cancellation themselves and with `LoadError::Network` otherwise. Dropping
/// the returned future must abort the request.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageFetchPort: Send + Sync {
    /// Fetches the raw bytes addressed by the locator.
    async fn fetch(&self, locator: &Url) -> Result<Bytes, LoadError>;
}
