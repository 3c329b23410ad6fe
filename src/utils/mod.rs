use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::DelayRange;

/// A simple wall-clock timer for logging elapsed time.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("⏱  Starting: {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "⏱  Finished: {} (took {:.2?})",
            self.label,
            self.start.elapsed()
        );
    }
}

/// Random duration drawn from `range`; a reversed range is read as its min.
pub fn jittered(range: DelayRange) -> Duration {
    let ms = if range.max > range.min {
        rand::random_range(range.min..=range.max)
    } else {
        range.min
    };
    Duration::from_millis(ms)
}

/// Human pacing between interactions. Not a correctness wait.
pub async fn pause(range: DelayRange) {
    let delay = jittered(range);
    if !delay.is_zero() {
        debug!("Pausing {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
