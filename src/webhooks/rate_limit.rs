use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Enforces a minimum interval after the last *successful* call.
///
/// One instance is shared by every caller of an endpoint. Acquiring a permit
/// locks the timestamp for the duration of the call, so two attempts can
/// never both see an expired interval.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_success: Mutex<Option<Instant>>,
}

/// Exclusive right to dispatch one attempt.
pub struct RatePermit<'a> {
    last_success: MutexGuard<'a, Option<Instant>>,
    waited: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_success: Mutex::new(None),
        }
    }

    /// Wait out whatever is left of the interval and take the permit.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let last_success = self.last_success.lock().await;

        let remaining = last_success
            .map(|at| self.min_interval.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO);

        if !remaining.is_zero() {
            debug!("Rate limit: sleeping {:?}", remaining);
            sleep(remaining).await;
        }

        RatePermit {
            last_success,
            waited: remaining,
        }
    }
}

impl RatePermit<'_> {
    /// Time spent sleeping before the permit was granted.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Start a new interval from now.
    pub fn mark_success(mut self) {
        *self.last_success = Some(Instant::now());
    }
}
