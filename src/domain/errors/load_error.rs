//! Load pipeline error types.

use thiserror::Error;

/// Failure categories of the load pipeline.
///
/// Every variant resolves to "no image" for the waiter; the variants only
/// differ in how they are logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The load was cancelled. Expected outcome, never logged as a failure.
    #[error("load cancelled")]
    Cancelled,

    /// Bytes were obtained but could not be interpreted as an image.
    #[error("decode error: {0}")]
    Decode(String),

    /// The fetch capability failed for a reason other than cancellation.
    #[error("network error: {0}")]
    Network(String),

    /// A disk read or write failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LoadError {
    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Returns whether this is the silent cancellation outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
