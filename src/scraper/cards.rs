//! Listing card harvesting.
//!
//! Card handles are never cached across an interaction: every index access
//! starts from a fresh [`PageSnapshot`], because clicking or navigating from
//! one card can re-render the list and invalidate the handles fetched before.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::fields::{Scope, extract_fields};
use super::wait::wait_for_presence;
use crate::browser::{BrowserError, Session};
use crate::config::{CrawlConfig, Locator, SiteConfig};
use crate::models::ListingRecord;

#[derive(Debug, Error)]
pub enum CardError {
    #[error("card {index} is no longer in the listing")]
    Vanished { index: usize },

    #[error("card {index} has no source_url")]
    MissingIdentity { index: usize },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// The card handles visible at one instant. Dropped after a single access.
pub struct PageSnapshot<E> {
    cards: Vec<E>,
}

impl<E> PageSnapshot<E> {
    pub async fn capture<S>(session: &S, locator: &Locator) -> Result<Self, BrowserError>
    where
        S: Session<Element = E>,
    {
        Ok(Self {
            cards: session.find_all(locator).await?,
        })
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn get(&self, index: usize) -> Option<&E> {
        self.cards.get(index)
    }

    pub fn into_first(self) -> Option<E> {
        self.cards.into_iter().next()
    }
}

/// Cards read from one page, plus how many had to be skipped.
#[derive(Debug, Default)]
pub struct Harvest {
    pub records: Vec<ListingRecord>,
    pub failures: usize,
}

pub struct CardHarvester<'a> {
    site: &'a SiteConfig,
    crawl: &'a CrawlConfig,
}

impl<'a> CardHarvester<'a> {
    pub fn new(site: &'a SiteConfig, crawl: &'a CrawlConfig) -> Self {
        Self { site, crawl }
    }

    /// Cards on the current page once they render; zero if none appear in time.
    pub async fn card_count<S: Session>(&self, session: &S) -> Result<usize, BrowserError> {
        match wait_for_presence(
            session,
            &self.site.cards,
            self.crawl.wait_timeout(),
            self.crawl.poll_interval(),
        )
        .await
        {
            Ok(()) => Ok(PageSnapshot::capture(session, &self.site.cards).await?.len()),
            Err(e) if e.is_timeout() => {
                warn!("No job cards found");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Partial record for the card at `index`, re-querying the card set first.
    pub async fn extract_card<S: Session>(
        &self,
        session: &S,
        index: usize,
        keyword: Option<&str>,
    ) -> Result<ListingRecord, CardError> {
        let snapshot = PageSnapshot::capture(session, &self.site.cards).await?;
        let card = snapshot.get(index).ok_or(CardError::Vanished { index })?;

        let values = extract_fields(session, Scope::Within(card), &self.site.fields).await?;
        let mut record = ListingRecord::default();
        record.enrich(values);
        if record.source_url.is_none() {
            return Err(CardError::MissingIdentity { index });
        }
        record.search_keyword = keyword.map(str::to_string);

        debug!(
            "Card {}: {} | {}",
            index,
            record.title.as_deref().unwrap_or("?"),
            record.source_url.as_deref().unwrap_or("?")
        );
        Ok(record)
    }

    /// Every card on the current page. A card that fails is logged with its
    /// index and skipped; only a lost session ends the page early.
    pub async fn harvest<S: Session>(
        &self,
        session: &S,
        keyword: Option<&str>,
    ) -> Result<Harvest, BrowserError> {
        let count = self.card_count(session).await?;
        info!("Found {} job cards", count);

        let mut harvest = Harvest::default();
        for index in 0..count {
            match self.extract_card(session, index, keyword).await {
                Ok(record) => harvest.records.push(record),
                Err(CardError::Browser(e)) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping card {}: {}", index, e);
                    harvest.failures += 1;
                }
            }
        }
        Ok(harvest)
    }
}
