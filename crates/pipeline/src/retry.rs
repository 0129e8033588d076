//! Bounded retry with exponential backoff for network stages.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// First backoff delay; doubled after each failed attempt.
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on a single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// How many times a failed operation is attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one. Zero means fail fast.
    pub extra_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub const NONE: Self = Self {
        extra_attempts: 0,
        base_delay: BASE_DELAY,
    };

    pub fn new(extra_attempts: u32) -> Self {
        Self {
            extra_attempts,
            base_delay: BASE_DELAY,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    /// Run `op` until it succeeds or the attempts are exhausted, returning
    /// the last error.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_when(operation, op, |_| true).await
    }

    /// Like [`run`](Self::run), but only errors for which `retryable`
    /// returns `true` are attempted again.
    pub async fn run_when<T, E, F, Fut, R>(
        &self,
        operation: &str,
        mut op: F,
        retryable: R,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.extra_attempts && retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}
