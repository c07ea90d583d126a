//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failure is worth retrying (transient only)
//! - Execute retries with exponential backoff + jitter
//! - Enforce a fixed retry ceiling so callers never block indefinitely
//!
//! # Design Decisions
//! - Permanent failures (bad request, closed connection) surface immediately
//! - Exhaustion returns the last error unchanged

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::DiscoveryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Errors that can tell a transient failure from a permanent one.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single sleep.
    pub max_delay: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_retries: 3,
        }
    }
}

impl From<&DiscoveryConfig> for RetryPolicy {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            max_retries: config.max_retries,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// ceiling is reached.
    pub async fn run<T, E, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    let delay = calculate_backoff(retries, self.base_delay, self.max_delay);
                    tracing::warn!(
                        operation = name,
                        attempt = retries,
                        max_retries = self.max_retries,
                        delay = ?delay,
                        error = %e,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
