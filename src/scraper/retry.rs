use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{FixedInterval, jitter};
use tracing::warn;

use crate::browser::BrowserError;
use crate::config::CrawlConfig;

/// Bounded retry shared by every transient-failure call site. Clones share
/// one retry counter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, including the first.
    pub attempts: usize,
    pub backoff: Duration,
    retries: Arc<AtomicUsize>,
}

impl RetryPolicy {
    pub fn new(attempts: usize, backoff: Duration) -> Self {
        Self {
            attempts,
            backoff,
            retries: Arc::default(),
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.attempts(), config.retry_backoff())
    }

    /// Repeat attempts made so far through this policy and its clones.
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::Relaxed)
    }

    /// Run `action` until it succeeds, `is_retryable` rejects the error, or
    /// the attempts are spent. Backoff is jittered.
    pub async fn run_if<T, E, A, Fut, C>(
        &self,
        what: &str,
        mut action: A,
        mut is_retryable: C,
    ) -> Result<T, E>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnMut(&E) -> bool,
        E: std::fmt::Display,
    {
        let strategy = FixedInterval::new(self.backoff)
            .map(jitter)
            .take(self.attempts.saturating_sub(1));

        let mut tries = 0usize;
        let counted = || {
            tries += 1;
            action()
        };
        let result = RetryIf::spawn(strategy, counted, |e: &E| {
            let retry = is_retryable(e);
            if retry {
                warn!("{} failed: {}", what, e);
            }
            retry
        })
        .await;

        self.retries
            .fetch_add(tries.saturating_sub(1), Ordering::Relaxed);
        result
    }

    /// [`run_if`](Self::run_if) with the crawl's transient/fatal split.
    pub async fn run<T, A, Fut>(&self, what: &str, action: A) -> Result<T, BrowserError>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        self.run_if(what, action, BrowserError::is_retryable).await
    }
}
