//! Command-line arguments.

use super::loader_config::LogVerbosity;
use clap::Parser;
use std::path::PathBuf;
use url::Url;

/// Cache output encoding selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EncodingArg {
    /// Lossless PNG.
    Png,
    /// JPEG, quality from `--jpeg-quality`.
    Jpeg,
}

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "pixcache",
    version,
    about = "Load images through a coalescing memory and disk cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image URLs to load. Duplicates share one download.
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<Url>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", env = "PIXCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when omitted.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Engine log verbosity.
    #[arg(long, value_enum)]
    pub log_level: Option<LogVerbosity>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH", env = "PIXCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Write each loaded image into this directory.
    #[arg(short, long, value_name = "PATH")]
    pub out_dir: Option<PathBuf>,

    /// Memory cache time-to-live in seconds.
    #[arg(long, value_name = "SECS")]
    pub memory_ttl: Option<u64>,

    /// Disk cache time-to-live in seconds.
    #[arg(long, value_name = "SECS")]
    pub disk_ttl: Option<u64>,

    /// Maximum entries in the memory cache.
    #[arg(long, value_name = "N")]
    pub memory_cache_size: Option<usize>,

    /// HTTP request timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Cancel an in-flight load when the same URL is requested again.
    #[arg(long)]
    pub cancel_previous: Option<bool>,

    /// Encoding used for cached bytes.
    #[arg(long, value_enum)]
    pub format: Option<EncodingArg>,

    /// JPEG quality (1-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    /// Resize every image to WIDTHxHEIGHT.
    #[arg(long, value_name = "WxH", value_parser = parse_dimensions)]
    pub resize: Option<(u32, u32)>,

    /// Convert every image to grayscale.
    #[arg(long)]
    pub grayscale: bool,

    /// Crop every image to a circle.
    #[arg(long)]
    pub circular: bool,
}

fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width = width
        .trim()
        .parse()
        .map_err(|e| format!("invalid width: {e}"))?;
    let height = height
        .trim()
        .parse()
        .map_err(|e| format!("invalid height: {e}"))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("64x48", Some((64, 48)) ; "lowercase")]
    #[test_case("64X48", Some((64, 48)) ; "uppercase")]
    #[test_case("64", None ; "missing_height")]
    #[test_case("ax48", None ; "bad_width")]
    fn test_parse_dimensions(input: &str, expected: Option<(u32, u32)>) {
        assert_eq!(parse_dimensions(input).ok(), expected);
    }

    #[test]
    fn test_parse_urls_and_transforms() {
        let args = CliArgs::parse_from([
            "pixcache",
            "--resize",
            "10x20",
            "--grayscale",
            "https://example.com/a.png",
            "https://example.com/a.png",
        ]);

        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.resize, Some((10, 20)));
        assert!(args.grayscale);
        assert!(!args.circular);
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(CliArgs::try_parse_from(["pixcache", "not a url"]).is_err());
    }
}
