//! HTTP implementation of the fetch port.

use std::time::Duration;

use bytes::Bytes;
use tracing::trace;
use url::Url;

use crate::domain::errors::LoadError;
use crate::domain::ports::ImageFetchPort;

/// Fetches image bytes with a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Creates a fetcher with the given request timeout.
    ///
    /// # Errors
    /// Returns `LoadError::Network` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pixcache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoadError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ImageFetchPort for HttpImageFetcher {
    async fn fetch(&self, locator: &Url) -> Result<Bytes, LoadError> {
        trace!(url = %locator, "Sending image request");

        let response = self
            .client
            .get(locator.clone())
            .send()
            .await
            .map_err(|e| LoadError::network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LoadError::network(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| LoadError::network(format!("Failed to read body: {e}")))
    }
}
