//! The crawl loop over keyword × page × card.
//!
//! One [`Crawler`] drives one session strictly sequentially. Every failure
//! below a lost session is absorbed where it happens: a field becomes
//! Missing, a card is skipped, a page ends pagination early, a keyword is
//! skipped. A lost session ends the run, and whatever [`CrawlState`] holds
//! at that point is still handed to the sink.

use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::browser::{BrowserError, Session};
use crate::config::{CrawlConfig, SiteConfig};
use crate::models::{CrawlStats, ListingRecord};
use crate::scraper::retry::RetryPolicy;
use crate::scraper::{
    AdvanceOutcome, CardError, CardHarvester, DetailOutcome, DetailVisitor, PageState,
    PaginationController, SearchDriver, SearchOutcome,
};

/// Mutable state of one run, owned by the crawler for its duration.
#[derive(Debug, Default)]
pub struct CrawlState {
    pub keyword_index: usize,
    pub page: u32,
    pub records: Vec<ListingRecord>,
    /// Where pagination stopped for the last keyword crawled.
    pub pagination: Option<PageState>,
    pub stats: CrawlStats,
    seen: HashSet<String>,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with identity keys captured elsewhere (an existing artifact, the ledger).
    pub fn with_seen(seen: HashSet<String>) -> Self {
        Self {
            seen,
            ..Self::default()
        }
    }

    /// Reserve `url` for this run; false if it was already taken.
    pub fn claim(&mut self, url: &str) -> bool {
        if self.seen.insert(url.to_string()) {
            true
        } else {
            debug!("Duplicate listing skipped: {}", url);
            self.stats.duplicates += 1;
            false
        }
    }

    /// Append a record whose identity key has been claimed.
    pub fn push(&mut self, record: ListingRecord) {
        self.stats.records += 1;
        self.records.push(record);
    }

    /// Claim and push in one step; false for a duplicate or a record without identity.
    pub fn accept(&mut self, record: ListingRecord) -> bool {
        let claimed = match record.source_url.as_deref() {
            Some(url) => self.claim(url),
            None => false,
        };
        if claimed {
            self.push(record);
        }
        claimed
    }
}

pub struct Crawler<'a, S: Session> {
    session: &'a S,
    site: &'a SiteConfig,
    crawl: &'a CrawlConfig,
    cancel: CancellationToken,
    /// Shared by search and pagination so one counter sees every retry.
    retry: RetryPolicy,
}

impl<'a, S: Session> Crawler<'a, S> {
    pub fn new(
        session: &'a S,
        site: &'a SiteConfig,
        crawl: &'a CrawlConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            site,
            crawl,
            cancel,
            retry: RetryPolicy::from_config(crawl),
        }
    }

    /// Crawl every keyword (or the bare listing when none are configured).
    /// Returns only when the session is lost; records gathered so far stay in `state`.
    pub async fn run(&self, state: &mut CrawlState) -> Result<(), BrowserError> {
        let result = self.crawl_keywords(state).await;
        state.stats.retries = self.retry.retries();
        result
    }

    async fn crawl_keywords(&self, state: &mut CrawlState) -> Result<(), BrowserError> {
        let keywords: Vec<Option<&str>> = if self.site.keywords.is_empty() {
            vec![None]
        } else {
            self.site.keywords.iter().map(|k| Some(k.as_str())).collect()
        };
        let search = SearchDriver::new(self.site, self.crawl).with_retry(self.retry.clone());

        for (index, keyword) in keywords.into_iter().enumerate() {
            if index > 0 && self.cancel.is_cancelled() {
                info!("Cancellation requested; skipping remaining keywords");
                state.stats.cancelled = true;
            }
            if state.stats.cancelled {
                break;
            }

            state.keyword_index = index;
            state.page = 1;
            state.stats.keywords += 1;

            let outcome = match keyword {
                Some(kw) => search.search(self.session, kw).await?,
                None => search.open_base(self.session).await?,
            };
            if let SearchOutcome::Failed(e) = outcome {
                warn!("Skipping keyword '{}': {}", keyword.unwrap_or_default(), e);
                state.stats.skipped_keywords += 1;
                continue;
            }

            let span = info_span!("keyword", keyword = keyword.unwrap_or("-"));
            self.crawl_pages(state, keyword).instrument(span).await?;
        }
        Ok(())
    }

    async fn crawl_pages(
        &self,
        state: &mut CrawlState,
        keyword: Option<&str>,
    ) -> Result<(), BrowserError> {
        let mut pager =
            PaginationController::new(self.site, self.crawl).with_retry(self.retry.clone());

        loop {
            state.page = pager.page();
            info!("📄 Scraping page {}", state.page);
            let before = state.records.len();
            self.harvest_page(state, keyword).await?;
            state.stats.pages += 1;
            info!(
                "Page {}: {} new records ({} total)",
                state.page,
                state.records.len() - before,
                state.records.len()
            );

            if self.cancel.is_cancelled() {
                info!("Cancellation requested; stopping after page {}", state.page);
                state.stats.cancelled = true;
                break;
            }
            if !matches!(pager.advance(self.session).await?, AdvanceOutcome::Advanced) {
                break;
            }
        }

        state.pagination = Some(pager.state());
        Ok(())
    }

    async fn harvest_page(
        &self,
        state: &mut CrawlState,
        keyword: Option<&str>,
    ) -> Result<(), BrowserError> {
        let harvester = CardHarvester::new(self.site, self.crawl);

        let Some(detail) = &self.site.detail else {
            let harvest = harvester.harvest(self.session, keyword).await?;
            state.stats.card_failures += harvest.failures;
            for record in harvest.records {
                state.accept(record);
            }
            return Ok(());
        };

        // With detail visits, cards are read and enriched one index at a time:
        // a visit may re-render the listing, so nothing is held across it.
        let visitor = DetailVisitor::new(self.site, self.crawl, detail);
        let count = harvester.card_count(self.session).await?;
        info!("Found {} job cards", count);

        for index in 0..count {
            let mut record = match harvester.extract_card(self.session, index, keyword).await {
                Ok(record) => record,
                Err(CardError::Browser(e)) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping card {}: {}", index, e);
                    state.stats.card_failures += 1;
                    continue;
                }
            };
            let Some(url) = record.source_url.clone() else {
                continue;
            };
            if !state.claim(&url) {
                continue;
            }

            match visitor.visit(self.session, &url).await {
                Ok(DetailOutcome::Extracted(values)) => record.enrich(values),
                Ok(DetailOutcome::Missing(_)) => state.stats.detail_failures += 1,
                Err(e) => {
                    // Claimed and read from the card already; keep it for the sink.
                    state.stats.detail_failures += 1;
                    state.push(record);
                    return Err(e);
                }
            }
            state.push(record);
        }
        Ok(())
    }
}
