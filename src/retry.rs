//! Bounded retry with exponential backoff for transient search failures.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::errors::CrawlError;

/// Retry budget and backoff shape applied to transient failures.
///
/// The delay schedule is a pure function of the attempt number so it can
/// be tested without touching the network.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each retry after that.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt`
    /// (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << doublings)
    }

    /// Run `op`, retrying transient failures until the budget is spent.
    ///
    /// Non-transient errors and the final transient failure are returned
    /// to the caller unchanged.
    pub fn run<T>(
        &self,
        label: &str,
        mut op: impl FnMut() -> Result<T, CrawlError>,
    ) -> Result<T, CrawlError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let wait = self.delay(attempt);
                    warn!(
                        "[geosweep:client] {label} failed (attempt {attempt}/{}): {err}; retrying in {:.1}s",
                        self.max_attempts,
                        wait.as_secs_f64()
                    );
                    thread::sleep(wait);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
