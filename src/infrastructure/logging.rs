//! Verbosity-gated logging for engine events.
//!
//! The host application owns the subscriber; these macros additionally gate
//! engine events on the configured `LogVerbosity` so `none` silences the
//! engine even under a permissive filter.

/// Emits a lifecycle or failure event when the config allows `basic` output.
///
/// `log_basic!(config, warn, key = %key, "message")`
macro_rules! log_basic {
    ($config:expr, $level:ident, $($arg:tt)+) => {
        if $config
            .log_level
            .emits($crate::infrastructure::config::LogVerbosity::Basic)
        {
            ::tracing::$level!($($arg)+);
        }
    };
}

/// Emits a join, cancel or registry event when the config allows `verbose` output.
macro_rules! log_verbose {
    ($config:expr, $($arg:tt)+) => {
        if $config
            .log_level
            .emits($crate::infrastructure::config::LogVerbosity::Verbose)
        {
            ::tracing::debug!($($arg)+);
        }
    };
}

pub(crate) use log_basic;
pub(crate) use log_verbose;
