mod browser;
mod config;
mod loader;
mod logging;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::{AppConfig, SiteConfig};
use crate::pipeline::Pipeline;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "job-crawl", about = "Paginated job-listing crawler", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl one site: a name under the sites directory or a path to its TOML
    Crawl {
        site: String,

        /// Search this keyword instead of the configured ones (repeatable)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Append to this file instead of a new timestamped artifact
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip listings captured by earlier runs
        #[arg(long)]
        skip_seen: bool,
    },

    /// List configured sites
    Sites,

    /// Show recent crawl runs
    Runs {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Apply schema migrations to the run ledger
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    let _guard = logging::init(&config.logging, cli.verbose)?;

    match cli.command {
        Command::Crawl {
            site,
            keywords,
            headed,
            output,
            skip_seen,
        } => {
            let mut site_config = SiteConfig::load(&config.site_path(&site))?;
            if !keywords.is_empty() {
                site_config.keywords = keywords;
            }
            site_config.validate()?;

            if headed {
                config.browser.headless = false;
            }
            if output.is_some() {
                config.output.append_to = output;
            }
            config.crawl.skip_seen |= skip_seen;

            let span = info_span!("crawl", site = %site_config.name);
            let pipeline = Pipeline::new(config, site_config);

            let cancel = pipeline.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; stopping after the current page");
                    cancel.cancel();
                }
            });

            match pipeline.run().instrument(span).await {
                Ok(report) => {
                    if let Some(path) = &report.artifact {
                        info!("Artifact: {:?}", path);
                    }
                    if let Some(e) = &report.error {
                        error!("Run ended early: {}", e);
                    }
                }
                Err(e) => error!("❌ Crawl failed: {:#}", e),
            }
        }

        Command::Sites => {
            let dir = &config.storage.sites_dir;
            let mut names: Vec<String> = std::fs::read_dir(dir)
                .with_context(|| format!("Cannot read sites directory {:?}", dir))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .collect();
            names.sort();

            if names.is_empty() {
                println!("No sites in {:?}.", dir);
            } else {
                println!("{} sites:", names.len());
                for name in &names {
                    match SiteConfig::load(&dir.join(format!("{}.toml", name))) {
                        Ok(site) => println!("  {:<14} {}", name, site.base_url),
                        Err(e) => println!("  {:<14} (invalid: {:#})", name, e),
                    }
                }
            }
        }

        Command::Runs { limit } => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            let runs = repo.recent_runs(limit)?;
            if runs.is_empty() {
                println!("No runs recorded — run `job-crawl crawl <site>` first.");
            } else {
                println!("──────────────────────────────────────────────────────────────────────────────");
                println!("  {:>4}  {:<12} {:<19}  {:<9} {:>5} {:>7} {:>7} {:>7}", "id", "site", "started", "status", "pages", "records", "retries", "took");
                println!("──────────────────────────────────────────────────────────────────────────────");
                for run in &runs {
                    let took = run
                        .finished_at
                        .map(|f| format!("{}s", (f - run.started_at).num_seconds()))
                        .unwrap_or("—".into());
                    println!(
                        "  {:>4}  {:<12} {:<19}  {:<9} {:>5} {:>7} {:>7} {:>7}",
                        run.id,
                        run.site,
                        run.started_at.format("%Y-%m-%d %H:%M:%S"),
                        run.status,
                        run.pages,
                        run.records,
                        run.retries,
                        took,
                    );
                    if let Some(artifact) = &run.artifact {
                        println!("        → {}", artifact);
                    }
                }
                println!("──────────────────────────────────────────────────────────────────────────────");
            }
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
