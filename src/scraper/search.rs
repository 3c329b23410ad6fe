use tracing::{info, warn};

use super::retry::RetryPolicy;
use super::wait::{wait_for_interactable, wait_for_presence};
use crate::browser::{BrowserError, Session};
use crate::config::{CrawlConfig, SiteConfig};
use crate::utils::pause;

#[derive(Debug)]
pub enum SearchOutcome {
    /// The listing is showing results (possibly zero) for the query.
    Settled,
    /// Retries spent; the keyword is skipped.
    Failed(BrowserError),
}

/// Puts the listing into its starting state: either the plain base URL or the
/// results of a keyword search.
pub struct SearchDriver<'a> {
    site: &'a SiteConfig,
    crawl: &'a CrawlConfig,
    retry: RetryPolicy,
}

impl<'a> SearchDriver<'a> {
    pub fn new(site: &'a SiteConfig, crawl: &'a CrawlConfig) -> Self {
        Self {
            site,
            crawl,
            retry: RetryPolicy::from_config(crawl),
        }
    }

    /// Retry through `retry`, sharing its counter with the caller.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reset to the base page, submit `keyword` and wait for the results to settle.
    pub async fn search<S: Session>(
        &self,
        session: &S,
        keyword: &str,
    ) -> Result<SearchOutcome, BrowserError> {
        let Some(control) = &self.site.search else {
            return Ok(SearchOutcome::Failed(BrowserError::NotFound(
                "search control".into(),
            )));
        };
        let base_url = self.site.base_url.as_str();
        let timeout = self.crawl.wait_timeout();
        let poll = self.crawl.poll_interval();
        let delay = self.crawl.action_delay_ms;

        info!("Searching for '{}'", keyword);
        let result = self
            .retry
            .run("keyword search", move || async move {
                session.goto(base_url).await?;
                let input = wait_for_interactable(session, &control.input, timeout, poll).await?;
                pause(delay).await;
                session.click(&input).await?;
                session.clear(&input).await?;
                session.type_text(&input, keyword).await?;
                pause(delay).await;
                session.submit(&input).await?;
                wait_for_presence(session, &control.results, timeout, poll).await
            })
            .await;

        settle(result, keyword)
    }

    /// Load the base page for a crawl without a search step.
    pub async fn open_base<S: Session>(&self, session: &S) -> Result<SearchOutcome, BrowserError> {
        let base_url = self.site.base_url.as_str();
        let ready = self.site.listing_ready();
        let timeout = self.crawl.wait_timeout();
        let poll = self.crawl.poll_interval();

        info!("Loading {}", base_url);
        let result = self
            .retry
            .run("listing load", move || async move {
                session.goto(base_url).await?;
                wait_for_presence(session, ready, timeout, poll).await
            })
            .await;

        settle(result, base_url)
    }
}

fn settle(result: Result<(), BrowserError>, what: &str) -> Result<SearchOutcome, BrowserError> {
    match result {
        Ok(()) => {
            info!("Page loaded for '{}'", what);
            Ok(SearchOutcome::Settled)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Giving up on '{}': {}", what, e);
            Ok(SearchOutcome::Failed(e))
        }
    }
}
