use tracing::{debug, info, warn};

use super::fields::{Scope, extract_fields};
use super::wait::wait_for_presence;
use crate::browser::{BrowserError, Session};
use crate::config::{CrawlConfig, DetailConfig, DetailStrategy, SiteConfig};
use crate::models::Field;
use crate::utils::pause;

#[derive(Debug)]
pub enum DetailOutcome {
    Extracted(Vec<(Field, Option<String>)>),
    /// Every supplementary field is Missing; the card's own fields stand.
    Missing(BrowserError),
}

/// Visits a listing's own page to read the fields the card does not show, then
/// hands control back to the listing it came from.
pub struct DetailVisitor<'a> {
    site: &'a SiteConfig,
    crawl: &'a CrawlConfig,
    detail: &'a DetailConfig,
}

impl<'a> DetailVisitor<'a> {
    pub fn new(site: &'a SiteConfig, crawl: &'a CrawlConfig, detail: &'a DetailConfig) -> Self {
        Self {
            site,
            crawl,
            detail,
        }
    }

    /// Only a lost session is returned as an error.
    pub async fn visit<S: Session>(&self, session: &S, url: &str) -> Result<DetailOutcome, BrowserError> {
        let result = match self.detail.strategy {
            DetailStrategy::NewTab => self.visit_in_tab(session, url).await,
            DetailStrategy::Navigate => self.visit_in_place(session, url).await,
        };
        match result {
            Ok(values) => Ok(DetailOutcome::Extracted(values)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Detail page {} unavailable: {}", url, e);
                Ok(DetailOutcome::Missing(e))
            }
        }
    }

    async fn visit_in_tab<S: Session>(
        &self,
        session: &S,
        url: &str,
    ) -> Result<Vec<(Field, Option<String>)>, BrowserError> {
        pause(self.crawl.action_delay_ms).await;
        let origin = session.open_tab(url).await?;
        info!("📄 Opened detail tab: {}", url);

        let extracted = self.read_page(session).await;
        let closed = session.close_tab(&origin).await;
        pause(self.crawl.action_delay_ms).await;

        closed?;
        extracted
    }

    async fn visit_in_place<S: Session>(
        &self,
        session: &S,
        url: &str,
    ) -> Result<Vec<(Field, Option<String>)>, BrowserError> {
        let listing_url = session.current_url().await?;
        session.goto(url).await?;
        info!("📄 Opened detail page: {}", url);

        let extracted = self.read_page(session).await;
        let returned = self.return_to_listing(session, &listing_url).await;

        returned?;
        extracted
    }

    async fn read_page<S: Session>(
        &self,
        session: &S,
    ) -> Result<Vec<(Field, Option<String>)>, BrowserError> {
        wait_for_presence(
            session,
            &self.detail.ready,
            self.crawl.detail_timeout(),
            self.crawl.poll_interval(),
        )
        .await?;
        extract_fields(session, Scope::Document, &self.detail.fields).await
    }

    /// History back, then wait for the listing to settle again. Falls back to
    /// reloading the listing URL if going back does not restore it.
    async fn return_to_listing<S: Session>(
        &self,
        session: &S,
        listing_url: &str,
    ) -> Result<(), BrowserError> {
        let ready = self.site.listing_ready();
        let timeout = self.crawl.wait_timeout();
        let poll = self.crawl.poll_interval();

        session.back().await?;
        let settled = wait_for_presence(session, ready, timeout, poll).await;
        pause(self.crawl.action_delay_ms).await;
        match settled {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("Listing did not come back ({}); reloading {}", e, listing_url);
                session.goto(listing_url).await?;
                wait_for_presence(session, ready, timeout, poll).await
            }
        }
    }
}
