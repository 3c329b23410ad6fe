use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::config::LogConfig;

/// Default directives for a `-v` count; `RUST_LOG` wins when set.
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "job_crawl=info,warn",
        1 => "job_crawl=debug,info",
        _ => "trace",
    }
}

/// Console plus a daily-rotating file under `config.dir`. Keep the returned
/// guard alive for the whole run or buffered file lines are lost.
pub fn init(config: &LogConfig, verbose: u8) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory {:?}", config.dir))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let (file_writer, guard) = non_blocking(rolling::daily(&config.dir, &config.file_prefix));
    let file_layer = fmt::Layer::new()
        .with_writer(file_writer)
        .with_target(false)
        .with_ansi(false);
    let console_layer = fmt::Layer::new().compact().with_target(false);

    Registry::default()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Logging already initialised")?;

    Ok(guard)
}
