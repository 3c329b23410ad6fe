//! The rendering engine as seen by the crawler: an opaque capability that can
//! navigate, query elements, click, type and read text. Everything above this
//! module is written against [`Session`] so the engine never knows which
//! browser (or test double) sits underneath.

#[cfg(test)]
pub mod fake;
pub mod webdriver;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::Locator;

pub use self::webdriver::WebDriverSession;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("no element matches {0}")]
    NotFound(String),

    #[error("element reference is stale")]
    Stale,

    #[error("timed out after {after:?} waiting for {what}")]
    TimedOut { what: String, after: Duration },

    #[error("browser command failed: {0}")]
    Command(String),

    #[error("browser session lost: {0}")]
    SessionLost(String),
}

impl BrowserError {
    /// Only a dead session escapes the orchestrator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::SessionLost(_))
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::TimedOut { .. })
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One live browsing session. Not shared across concurrent operations; every
/// call is awaited before the next is issued.
#[async_trait]
pub trait Session: Send + Sync {
    /// Handle to a node in the rendered document. May go stale.
    type Element: Clone + Send + Sync;
    /// Handle to a browser window or tab.
    type Window: Clone + Send + Sync;

    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn back(&self) -> Result<(), BrowserError>;

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Self::Element>, BrowserError>;
    async fn find_all_in(
        &self,
        parent: &Self::Element,
        locator: &Locator,
    ) -> Result<Vec<Self::Element>, BrowserError>;

    async fn text(&self, element: &Self::Element) -> Result<String, BrowserError>;
    async fn attr(&self, element: &Self::Element, name: &str)
    -> Result<Option<String>, BrowserError>;
    async fn inner_html(&self, element: &Self::Element) -> Result<String, BrowserError>;
    async fn is_enabled(&self, element: &Self::Element) -> Result<bool, BrowserError>;

    /// True once the node is no longer attached to the live document.
    async fn is_stale(&self, element: &Self::Element) -> Result<bool, BrowserError>;

    async fn click(&self, element: &Self::Element) -> Result<(), BrowserError>;
    /// Click dispatched from script, for affordances a native click cannot reach.
    async fn script_click(&self, element: &Self::Element) -> Result<(), BrowserError>;
    async fn scroll_into_view(&self, element: &Self::Element) -> Result<(), BrowserError>;

    async fn clear(&self, element: &Self::Element) -> Result<(), BrowserError>;
    async fn type_text(&self, element: &Self::Element, text: &str) -> Result<(), BrowserError>;
    /// Press Enter in the element.
    async fn submit(&self, element: &Self::Element) -> Result<(), BrowserError>;

    /// Open `url` in a new tab and switch to it; returns the window to return to.
    async fn open_tab(&self, url: &str) -> Result<Self::Window, BrowserError>;
    /// Close the current tab and switch back to `return_to`.
    async fn close_tab(&self, return_to: &Self::Window) -> Result<(), BrowserError>;

    /// End the session. Further calls fail with [`BrowserError::SessionLost`].
    async fn quit(&self) -> Result<(), BrowserError>;
}
