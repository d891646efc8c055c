//! Application configuration.

/// Binary configuration file and CLI merge.
pub mod app_config;
/// Command-line arguments.
pub mod args;
/// Load engine policy and its shared handle.
pub mod loader_config;
/// Config file storage.
pub mod storage;

pub use app_config::AppConfig;
pub use args::CliArgs;
pub use loader_config::{ConfigHandle, LoaderConfig, LogVerbosity};
pub use storage::StorageManager;
