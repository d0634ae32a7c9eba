//! Bounded retry for transport-level failures.
//!
//! Only errors surfaced by the transport itself (connection reset, DNS
//! failure, timeout) go through here; HTTP error statuses come back as
//! ordinary responses and are never retried.

use std::fmt::Display;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// How many times a failed request is retried before giving up.
pub const MAX_TRANSPORT_RETRIES: u32 = 3;

/// Base delay unit: the n-th retry waits `n * RETRY_BASE_DELAY`.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Fixed retry configuration for outbound requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_TRANSPORT_RETRIES,
            base_delay: RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Runs `op`, retrying on `Err` with a linearly growing delay.
    ///
    /// The n-th failure waits `n * base_delay` before the next try; once
    /// `max_retries` retries are spent, the final error is returned.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut failures = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(error);
                    }
                    let delay = self.base_delay * failures;
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transport failure, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
