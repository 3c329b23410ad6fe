//! Bounded polling over the rendered document.
//!
//! Every wait carries a deadline and reports expiry as
//! [`BrowserError::TimedOut`]; a false predicate is never an error. Transient
//! failures while evaluating a predicate count as "not yet", only a lost
//! session cuts the wait short.

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::trace;

use crate::browser::{BrowserError, Session};
use crate::config::Locator;

pub async fn await_condition<F, Fut>(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut predicate: F,
) -> Result<(), BrowserError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, BrowserError>>,
{
    let deadline = Instant::now() + timeout;
    let timed_out = || BrowserError::TimedOut {
        what: what.to_string(),
        after: timeout,
    };

    let polling = async {
        loop {
            match predicate().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => trace!("{}: predicate not ready ({})", what, e),
            }
            if Instant::now() + poll > deadline {
                return Err(timed_out());
            }
            sleep(poll).await;
        }
    };

    // A single hung predicate evaluation must not outlive the deadline either.
    match tokio::time::timeout(timeout, polling).await {
        Ok(result) => result,
        Err(_) => Err(timed_out()),
    }
}

/// At least one element matches `locator`.
pub async fn wait_for_presence<S: Session>(
    session: &S,
    locator: &Locator,
    timeout: Duration,
    poll: Duration,
) -> Result<(), BrowserError> {
    let what = format!("presence of {}", locator);
    await_condition(&what, timeout, poll, move || async move {
        Ok(!session.find_all(locator).await?.is_empty())
    })
    .await
}

/// First element matching `locator` once it accepts input.
pub async fn wait_for_interactable<S: Session>(
    session: &S,
    locator: &Locator,
    timeout: Duration,
    poll: Duration,
) -> Result<S::Element, BrowserError> {
    let what = format!("{} to be interactable", locator);
    await_condition(&what, timeout, poll, move || async move {
        match session.find_all(locator).await?.first() {
            Some(el) => session.is_enabled(el).await,
            None => Ok(false),
        }
    })
    .await?;

    session
        .find_all(locator)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| BrowserError::NotFound(locator.to_string()))
}

/// The element has detached from the live document, i.e. the page changed.
pub async fn wait_for_staleness<S: Session>(
    session: &S,
    element: &S::Element,
    timeout: Duration,
    poll: Duration,
) -> Result<(), BrowserError> {
    await_condition("previous page to detach", timeout, poll, move || {
        session.is_stale(element)
    })
    .await
}
