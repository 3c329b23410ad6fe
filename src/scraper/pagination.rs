//! Pagination state machine.
//!
//! `Listing(n)` → `Advancing` → `Listing(n + 1)` | `Exhausted`.
//!
//! A click on the advance control only counts once the first card captured
//! beforehand has detached from the document. If that never happens within one
//! wait cycle the listing is treated as exhausted rather than clicked again.

use std::fmt;
use tracing::{debug, info, warn};

use super::cards::PageSnapshot;
use super::retry::RetryPolicy;
use super::wait::{wait_for_presence, wait_for_staleness};
use crate::browser::{BrowserError, Session};
use crate::config::{CrawlConfig, Locator, Pagination, SiteConfig};
use crate::utils::pause;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Listing(u32),
    Advancing,
    Exhausted(ExhaustReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    NotPaginated,
    NoControl,
    Disabled,
    /// Clicked, but the page never changed.
    NoTransition,
    EmptyPage,
    PageCap,
    AdvanceFailed,
}

impl fmt::Display for ExhaustReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExhaustReason::NotPaginated => "site is not paginated",
            ExhaustReason::NoControl => "no next control",
            ExhaustReason::Disabled => "next control disabled",
            ExhaustReason::NoTransition => "page did not change after advancing",
            ExhaustReason::EmptyPage => "no cards on page",
            ExhaustReason::PageCap => "page cap reached",
            ExhaustReason::AdvanceFailed => "advance failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum AdvanceOutcome {
    Advanced,
    Exhausted(ExhaustReason),
    Failed(BrowserError),
}

pub struct PaginationController<'a> {
    site: &'a SiteConfig,
    crawl: &'a CrawlConfig,
    retry: RetryPolicy,
    state: PageState,
    page: u32,
}

impl<'a> PaginationController<'a> {
    /// Controller positioned on page 1 of a freshly loaded listing.
    pub fn new(site: &'a SiteConfig, crawl: &'a CrawlConfig) -> Self {
        Self {
            site,
            crawl,
            retry: RetryPolicy::from_config(crawl),
            state: PageState::Listing(1),
            page: 1,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The site's own page cap, else the crawl-wide one.
    fn max_pages(&self) -> u32 {
        self.site.max_pages.unwrap_or(self.crawl.max_pages)
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Last listing page reached.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Move to the next page. Only a lost session is returned as an error.
    pub async fn advance<S: Session>(&mut self, session: &S) -> Result<AdvanceOutcome, BrowserError> {
        if let PageState::Exhausted(reason) = self.state {
            return Ok(AdvanceOutcome::Exhausted(reason));
        }
        if self.page >= self.max_pages() {
            warn!("Stopping at page cap ({})", self.max_pages());
            self.state = PageState::Exhausted(ExhaustReason::PageCap);
            return Ok(AdvanceOutcome::Exhausted(ExhaustReason::PageCap));
        }

        self.state = PageState::Advancing;
        let result = match &self.site.pagination {
            Pagination::None => Ok(AdvanceOutcome::Exhausted(ExhaustReason::NotPaginated)),
            Pagination::NextButton { locator } => self.click_next(session, locator).await,
            Pagination::UrlTemplate { template } => self.load_page(session, template).await,
        };
        let outcome = match result {
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => AdvanceOutcome::Failed(e),
            Ok(outcome) => outcome,
        };

        self.state = match &outcome {
            AdvanceOutcome::Advanced => {
                self.page += 1;
                info!("➡️  Moved to page {}", self.page);
                PageState::Listing(self.page)
            }
            AdvanceOutcome::Exhausted(reason) => {
                info!("⛔ Pagination finished after page {}: {}", self.page, reason);
                PageState::Exhausted(*reason)
            }
            AdvanceOutcome::Failed(e) => {
                warn!("Could not advance past page {}: {}", self.page, e);
                PageState::Exhausted(ExhaustReason::AdvanceFailed)
            }
        };
        Ok(outcome)
    }

    async fn click_next<S: Session>(
        &self,
        session: &S,
        locator: &Locator,
    ) -> Result<AdvanceOutcome, BrowserError> {
        let snapshot = PageSnapshot::capture(session, &self.site.cards).await?;
        let Some(first) = snapshot.into_first() else {
            return Ok(AdvanceOutcome::Exhausted(ExhaustReason::EmptyPage));
        };
        let Some(next) = session.find_all(locator).await?.into_iter().next() else {
            return Ok(AdvanceOutcome::Exhausted(ExhaustReason::NoControl));
        };
        if is_disabled(session, &next).await? {
            return Ok(AdvanceOutcome::Exhausted(ExhaustReason::Disabled));
        }

        if let Err(e) = session.scroll_into_view(&next).await {
            if e.is_fatal() {
                return Err(e);
            }
            debug!("Could not scroll next control into view: {}", e);
        }
        if let Err(e) = session.click(&next).await {
            if e.is_fatal() {
                return Err(e);
            }
            debug!("Native click failed ({}); using script click", e);
            session.script_click(&next).await?;
        }

        match wait_for_staleness(
            session,
            &first,
            self.crawl.wait_timeout(),
            self.crawl.poll_interval(),
        )
        .await
        {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                return Ok(AdvanceOutcome::Exhausted(ExhaustReason::NoTransition));
            }
            Err(e) => return Err(e),
        }

        pause(self.crawl.page_delay_ms).await;
        Ok(AdvanceOutcome::Advanced)
    }

    async fn load_page<S: Session>(
        &self,
        session: &S,
        template: &str,
    ) -> Result<AdvanceOutcome, BrowserError> {
        let url = template.replace("{page}", &(self.page + 1).to_string());
        let url = url.as_str();
        let cards = &self.site.cards;
        let timeout = self.crawl.wait_timeout();
        let poll = self.crawl.poll_interval();
        pause(self.crawl.page_delay_ms).await;

        let result = self
            .retry
            .run("page load", move || async move {
                session.goto(url).await?;
                wait_for_presence(session, cards, timeout, poll).await
            })
            .await;

        match result {
            Ok(()) => Ok(AdvanceOutcome::Advanced),
            Err(e) if e.is_timeout() => Ok(AdvanceOutcome::Exhausted(ExhaustReason::EmptyPage)),
            Err(e) => Err(e),
        }
    }
}

/// Disabled by attribute, ARIA state, CSS class, or the driver's own check.
async fn is_disabled<S: Session>(session: &S, control: &S::Element) -> Result<bool, BrowserError> {
    if session.attr(control, "disabled").await?.is_some() {
        return Ok(true);
    }
    if session
        .attr(control, "aria-disabled")
        .await?
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return Ok(true);
    }
    if session
        .attr(control, "class")
        .await?
        .is_some_and(|c| c.split_whitespace().any(|class| class.contains("disabled")))
    {
        return Ok(true);
    }
    Ok(!session.is_enabled(control).await?)
}
