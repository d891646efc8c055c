//! Load engine policy shared by the engine and both cache tiers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::entities::OutputEncoding;

/// Verbosity of the engine's own events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    /// No engine events.
    None,
    /// Lifecycle and failure events.
    #[default]
    Basic,
    /// Lifecycle, failures, joins, cancellations and registry state.
    Verbose,
}

impl LogVerbosity {
    /// Returns whether an event of the given verbosity is emitted.
    #[must_use]
    pub fn emits(self, event: Self) -> bool {
        event != Self::None && self >= event
    }

    /// Subscriber filter directive matching this verbosity.
    #[must_use]
    pub const fn filter_directive(self) -> &'static str {
        match self {
            Self::None => "off",
            Self::Basic => "info",
            Self::Verbose => "debug",
        }
    }
}

impl std::fmt::Display for LogVerbosity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Basic => write!(f, "basic"),
            Self::Verbose => write!(f, "verbose"),
        }
    }
}

/// Policy consumed by the load engine and the cache tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// A new load for a locator already in flight cancels the old task
    /// instead of joining it.
    #[serde(default)]
    pub cancel_previous_on_reissue: bool,

    /// Allow `cancel_all` to cancel every in-flight task.
    #[serde(default = "default_true")]
    pub enable_global_cancel: bool,

    /// Engine log verbosity.
    #[serde(default)]
    pub log_level: LogVerbosity,

    /// Memory tier time-to-live in seconds.
    #[serde(default)]
    pub memory_ttl_secs: Option<u64>,

    /// Disk tier time-to-live in seconds.
    #[serde(default)]
    pub disk_ttl_secs: Option<u64>,

    /// Encoding used for bytes written into the caches.
    #[serde(default)]
    pub output_encoding: OutputEncoding,

    /// Maximum entries in the memory cache.
    #[serde(default = "default_memory_cache_size")]
    pub memory_cache_size: usize,

    /// Maximum disk cache size in bytes.
    #[serde(default = "default_disk_cache_size")]
    pub disk_cache_size: u64,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_memory_cache_size() -> usize {
    crate::infrastructure::image::memory_cache::DEFAULT_CACHE_SIZE
}

fn default_disk_cache_size() -> u64 {
    crate::infrastructure::image::disk_cache::DEFAULT_MAX_CACHE_SIZE
}

fn default_timeout_secs() -> u64 {
    30
}

impl LoaderConfig {
    /// Memory tier TTL, if configured.
    #[must_use]
    pub fn memory_ttl(&self) -> Option<Duration> {
        self.memory_ttl_secs.map(Duration::from_secs)
    }

    /// Disk tier TTL, if configured.
    #[must_use]
    pub fn disk_ttl(&self) -> Option<Duration> {
        self.disk_ttl_secs.map(Duration::from_secs)
    }

    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cancel_previous_on_reissue: false,
            enable_global_cancel: true,
            log_level: LogVerbosity::Basic,
            memory_ttl_secs: None,
            disk_ttl_secs: None,
            output_encoding: OutputEncoding::Png,
            memory_cache_size: default_memory_cache_size(),
            disk_cache_size: default_disk_cache_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Shared, replaceable handle to the current `LoaderConfig`.
///
/// Readers take a snapshot; `replace` only affects snapshots taken afterwards.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<LoaderConfig>>>,
}

impl ConfigHandle {
    /// Creates a handle holding the given config.
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Returns the current config snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<LoaderConfig> {
        self.inner.read().clone()
    }

    /// Replaces the config for all later lookups and entries.
    pub fn replace(&self, config: LoaderConfig) {
        *self.inner.write() = Arc::new(config);
    }
}
