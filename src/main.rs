use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, bail};
use futures_util::future::join_all;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pixcache::domain::entities::ImageTransform;
use pixcache::domain::ports::ImageCodecPort;
use pixcache::infrastructure::{
    AppConfig, CliArgs, ConfigHandle, DiskImageCache, HttpImageFetcher, ImageCrateCodec,
    ImageLoader, StorageManager, transforms,
};
use pixcache::{LoadedImage, OutputEncoding};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,{}={}",
            pixcache::NAME,
            config.loader.log_level.filter_directive()
        ))
    });

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> AppConfig {
    let loaded = StorageManager::new().and_then(|storage| storage.load_config(args.config.as_deref()));
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}. Using defaults.");
        AppConfig::default()
    });
    config.merge_with_args(args);
    config
}

fn build_transform(args: &CliArgs) -> Option<ImageTransform> {
    let mut steps = Vec::new();
    if let Some((width, height)) = args.resize {
        steps.push(transforms::resize(width, height));
    }
    if args.grayscale {
        steps.push(transforms::grayscale());
    }
    if args.circular {
        steps.push(transforms::circular());
    }

    match steps.len() {
        0 => None,
        1 => steps.pop(),
        _ => Some(transforms::chain(steps)),
    }
}

async fn write_output(dir: &Path, loaded: &LoadedImage, encoding: OutputEncoding) -> Result<()> {
    let image = loaded.image.clone();
    let bytes = tokio::task::spawn_blocking(move || ImageCrateCodec.encode(&image, encoding)).await??;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{}", loaded.key.file_stem(), encoding.extension()));
    tokio::fs::write(&path, bytes).await?;
    info!(path = %path.display(), "Wrote image");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args);
    init_logging(&config)?;

    info!(version = pixcache::VERSION, "Starting pixcache");

    let handle = ConfigHandle::new(config.loader.clone());
    let disk_cache = Arc::new(
        DiskImageCache::new(
            config.effective_cache_dir(),
            config.loader.disk_cache_size,
            handle.clone(),
        )
        .await,
    );
    let fetcher = Arc::new(HttpImageFetcher::new(config.loader.timeout())?);
    let loader = ImageLoader::new(handle, disk_cache, fetcher);

    let transform = build_transform(&args);
    let results = join_all(
        args.urls
            .iter()
            .map(|url| loader.load_async(url.clone(), transform.clone())),
    )
    .await;

    let mut failures = 0usize;
    for (url, result) in args.urls.iter().zip(results) {
        let Some(loaded) = result else {
            println!("{url} -> failed");
            failures += 1;
            continue;
        };

        let (width, height) = loaded.dimensions();
        println!("{url} -> {width}x{height} ({})", loaded.source);

        if let Some(dir) = &config.output_dir {
            if let Err(e) = write_output(dir, &loaded, config.loader.output_encoding).await {
                warn!(url = %url, error = %e, "Failed to write image");
                failures += 1;
            }
        }
    }

    let memory = loader.memory_cache_stats();
    let disk = loader.disk_cache_stats();
    info!(memory = %memory, disk = %disk, "Cache statistics");

    if failures > 0 {
        bail!("{failures} of {} images failed", args.urls.len());
    }
    Ok(())
}
