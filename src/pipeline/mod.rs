//! Pipeline orchestrator: ties browser → crawler → sink/ledger together.
//!
//! ## One run
//!
//!   1. Start a browser session (the only step that can fail before crawling).
//!   2. Seed the dedup set from the artifact being appended to, and from the
//!      ledger's seen listings when `skip_seen` is on.
//!   3. Crawl every keyword × page × card.
//!   4. Quit the session, whatever the crawl returned.
//!   5. Write the records, mark them seen and close the ledger entry.
//!
//! A lost session is logged and recorded, not returned: the run still ends
//! normally with the records it had.

pub mod crawler;

use anyhow::{Context, Result};
use chrono::Local;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::{Session, WebDriverSession};
use crate::config::{AppConfig, SiteConfig};
use crate::loader;
use crate::models::CrawlStats;
use crate::storage::{CsvSink, Repository};
use crate::utils::Timer;

pub use self::crawler::{CrawlState, Crawler};

pub struct Pipeline {
    config: AppConfig,
    site: SiteConfig,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct CrawlReport {
    pub site: String,
    pub stats: CrawlStats,
    /// `None` when nothing was captured.
    pub artifact: Option<PathBuf>,
    /// Set when the session was lost mid-run.
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl Pipeline {
    pub fn new(config: AppConfig, site: SiteConfig) -> Self {
        Self {
            config,
            site,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the crawl after the page in progress.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<CrawlReport> {
        let ledger = self.open_ledger();
        let session = WebDriverSession::launch(&self.config.browser)
            .await
            .context("Failed to start browser session")?;
        self.run_with(&session, ledger.as_ref()).await
    }

    /// The run body against any session. The session is quit before returning
    /// on every path.
    pub async fn run_with<S: Session>(
        &self,
        session: &S,
        ledger: Option<&Repository>,
    ) -> Result<CrawlReport> {
        let site = &self.site;
        let timer = Timer::start(format!("{} crawl", site.name));
        let artifact = self
            .config
            .output
            .artifact_path(&site.name, Local::now().naive_local());

        let run_id = ledger.and_then(|repo| match repo.begin_run(&site.name) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Run ledger unavailable: {:#}", e);
                None
            }
        });

        let mut state = CrawlState::with_seen(self.seed_seen(&artifact, ledger));
        let crawler = Crawler::new(session, site, &self.config.crawl, self.cancel.clone());
        let result = crawler.run(&mut state).await;

        if let Err(e) = session.quit().await {
            warn!("Browser teardown: {}", e);
        }

        let error = match result {
            Ok(()) => None,
            Err(e) => {
                error!("❌ Fatal error during crawl: {:?}", e);
                Some(e.to_string())
            }
        };

        let written = if state.records.is_empty() {
            warn!("⚠️ No data scraped.");
            Ok(None)
        } else {
            CsvSink::new(&artifact)
                .write(&state.records)
                .map(|_| Some(artifact.clone()))
        };

        if let (Some(repo), Some(id)) = (ledger, run_id) {
            let failure = error
                .clone()
                .or_else(|| written.as_ref().err().map(|e| format!("{:#}", e)));
            let closed = repo
                .mark_seen(&site.name, id, &state.records)
                .and_then(|_| {
                    repo.finish_run(id, &state.stats, written_path(&written), failure.as_deref())
                });
            if let Err(e) = closed {
                warn!("Could not update run ledger: {:#}", e);
            }
        }

        let artifact = written?;
        let stats = state.stats;
        let elapsed = timer.elapsed();
        info!(
            "=== Done in {:.1?}: {} records | {} pages | {} duplicates | {} card failures | {} detail failures | {} skipped keywords | {} retries{} ===",
            elapsed,
            stats.records,
            stats.pages,
            stats.duplicates,
            stats.card_failures,
            stats.detail_failures,
            stats.skipped_keywords,
            stats.retries,
            if stats.cancelled { " | cancelled" } else { "" },
        );

        Ok(CrawlReport {
            site: site.name.clone(),
            stats,
            artifact,
            error,
            elapsed,
        })
    }

    fn open_ledger(&self) -> Option<Repository> {
        if !self.config.storage.enabled {
            return None;
        }
        let opened = Repository::open(&self.config.storage.db_path)
            .and_then(|repo| repo.run_migrations().map(|_| repo));
        match opened {
            Ok(repo) => Some(repo),
            Err(e) => {
                warn!("Run ledger disabled: {:#}", e);
                None
            }
        }
    }

    fn seed_seen(&self, artifact: &std::path::Path, ledger: Option<&Repository>) -> HashSet<String> {
        let mut seen = match loader::seen_urls(artifact) {
            Ok(seen) => seen,
            Err(e) => {
                warn!("Could not read existing {:?}: {:#}", artifact, e);
                HashSet::new()
            }
        };
        if !seen.is_empty() {
            info!("Appending to {:?}; {} listings already present", artifact, seen.len());
        }

        if self.config.crawl.skip_seen {
            if let Some(repo) = ledger {
                match repo.seen_urls(&self.site.name) {
                    Ok(urls) => {
                        info!("Skipping {} listings seen in earlier runs", urls.len());
                        seen.extend(urls);
                    }
                    Err(e) => warn!("Could not load seen listings: {:#}", e),
                }
            }
        }
        seen
    }
}

fn written_path(written: &Result<Option<PathBuf>>) -> Option<&std::path::Path> {
    written.as_ref().ok().and_then(|p| p.as_deref())
}
