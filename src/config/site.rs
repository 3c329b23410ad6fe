//! Declarative description of one career site.
//!
//! Everything site-specific (URLs, locators, field wiring, pagination style,
//! detail-page strategy) lives here so the crawl engine stays site-agnostic.
//! One TOML file per site, e.g. `sites/rsm.toml`:
//!
//! ```toml
//! name = "rsm"
//! base_url = "https://rsm.wd1.myworkdayjobs.com/en-US/RSMCareers"
//! keywords = ["Microsoft Dynamics", "Power Platform"]
//! cards = { css = "section[data-automation-id='jobResults'] > ul > li" }
//!
//! [search]
//! input = { css = "input[data-automation-id='keywordSearchInput']" }
//! results = { css = "p[data-automation-id='jobFoundText']" }
//!
//! [[fields]]
//! field = "source_url"
//! locator = { css = "h3 > a" }
//! read = { attribute = "href" }
//!
//! [pagination]
//! mode = "next_button"
//! locator = { css = "button[aria-label='next']" }
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::Field;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Css(String),
    Xpath(String),
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css `{}`", s),
            Locator::Xpath(s) => write!(f, "xpath `{}`", s),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub name: String,
    pub base_url: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// Listing-settled predicate when no search step runs; defaults to `cards`.
    #[serde(default)]
    pub ready: Option<Locator>,

    #[serde(default)]
    pub search: Option<SearchConfig>,

    pub cards: Locator,

    pub fields: Vec<FieldSpec>,

    #[serde(default)]
    pub pagination: Pagination,

    /// Overrides `crawl.max_pages` for this site.
    #[serde(default)]
    pub max_pages: Option<u32>,

    #[serde(default)]
    pub detail: Option<DetailConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub input: Locator,
    /// Present once the result state has settled (may hold zero cards).
    pub results: Locator,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Pagination {
    #[default]
    None,
    NextButton {
        locator: Locator,
    },
    /// Pages addressable by URL; `{page}` is replaced by the 1-based page number.
    UrlTemplate {
        template: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailStrategy {
    NewTab,
    Navigate,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetailConfig {
    pub strategy: DetailStrategy,
    pub ready: Locator,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldSpec {
    pub field: Field,
    /// Relative to the container; `None` reads the container itself.
    #[serde(default)]
    pub locator: Option<Locator>,
    #[serde(default)]
    pub read: Read,
    #[serde(default)]
    pub combine: Combine,
    #[serde(default)]
    pub transform: Option<Transform>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Read {
    #[default]
    Text,
    /// Inner HTML reduced to text.
    Html,
    Attribute(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    #[default]
    First,
    Nth(usize),
    /// Multi-valued field: all matches joined by the separator.
    Join(String),
    /// Numeric range: `locator` holds the minimum, this locator the maximum.
    Range(Locator),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Keep the text after the last delimiter ("Level: Senior" → "Senior").
    AfterLast(String),
    /// Path segment counted from the end of a URL, ignoring a trailing slash.
    UrlSegment(usize),
}

impl SiteConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .build()
            .with_context(|| format!("Failed to read site config {:?}", path))?;

        let site: SiteConfig = cfg
            .try_deserialize()
            .with_context(|| format!("Invalid site config {:?}", path))?;
        site.validate()?;
        Ok(site)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .with_context(|| format!("{}: base_url {:?} is not a URL", self.name, self.base_url))?;

        if !self.fields.iter().any(|f| f.field == Field::SourceUrl) {
            bail!("{}: card fields must include `source_url`", self.name);
        }
        if !self.keywords.is_empty() && self.search.is_none() {
            bail!("{}: keywords configured but no [search] control", self.name);
        }
        if let Pagination::UrlTemplate { template } = &self.pagination {
            if !template.contains("{page}") {
                bail!("{}: pagination template lacks {{page}}", self.name);
            }
            if !self.keywords.is_empty() {
                bail!("{}: url_template pagination cannot follow a keyword search", self.name);
            }
        }
        if self.max_pages == Some(0) {
            bail!("{}: max_pages must be at least 1", self.name);
        }
        if let Some(detail) = &self.detail {
            if detail.fields.is_empty() {
                bail!("{}: [detail] declares no fields", self.name);
            }
        }

        let detail_fields = self.detail.iter().flat_map(|d| d.fields.iter());
        for spec in self.fields.iter().chain(detail_fields) {
            if let Some(Transform::AfterLast(delimiter)) = &spec.transform {
                if delimiter.is_empty() {
                    bail!(
                        "{}: `{}` has an empty after_last delimiter",
                        self.name,
                        spec.field.column()
                    );
                }
            }
        }
        Ok(())
    }

    /// Locator whose presence means the listing has rendered.
    pub fn listing_ready(&self) -> &Locator {
        self.ready.as_ref().unwrap_or(&self.cards)
    }
}
