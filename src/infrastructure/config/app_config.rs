//! Command-line application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::args::{CliArgs, EncodingArg};
use super::loader_config::LoaderConfig;
use crate::domain::entities::OutputEncoding;
use crate::infrastructure::image::default_cache_dir;

const APP_NAME: &str = "pixcache";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Default JPEG quality when `--format jpeg` is given without a quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Application configuration from the config file and CLI.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Disk cache directory. Defaults to the platform cache directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Directory to write loaded images into.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Load engine policy.
    #[serde(default)]
    pub loader: LoaderConfig,
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache_dir = Some(cache_dir.clone());
        }
        if let Some(out_dir) = &args.out_dir {
            self.output_dir = Some(out_dir.clone());
        }
        if let Some(log_level) = args.log_level {
            self.loader.log_level = log_level;
        }
        if let Some(ttl) = args.memory_ttl {
            self.loader.memory_ttl_secs = Some(ttl);
        }
        if let Some(ttl) = args.disk_ttl {
            self.loader.disk_ttl_secs = Some(ttl);
        }
        if let Some(size) = args.memory_cache_size {
            self.loader.memory_cache_size = size;
        }
        if let Some(timeout) = args.timeout {
            self.loader.timeout_secs = timeout;
        }
        if let Some(cancel_previous) = args.cancel_previous {
            self.loader.cancel_previous_on_reissue = cancel_previous;
        }
        match (args.format, args.jpeg_quality) {
            (Some(EncodingArg::Png), _) => self.loader.output_encoding = OutputEncoding::Png,
            (Some(EncodingArg::Jpeg), quality) => {
                self.loader.output_encoding = OutputEncoding::Jpeg {
                    quality: quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                };
            }
            (None, Some(quality)) => {
                if let OutputEncoding::Jpeg { .. } = self.loader.output_encoding {
                    self.loader.output_encoding = OutputEncoding::Jpeg { quality };
                }
            }
            (None, None) => {}
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns effective log path, if file logging was requested.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone()
    }

    /// Returns the disk cache directory to use.
    #[must_use]
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }
}
