//! Fixed-delay retry for fallible remote calls.
//!
//! An operation is attempted `1 + max_retries` times with a constant pause
//! between attempts. There is no backoff and no error classification: every
//! failure is retried except [`Error::Interrupted`], which ends the chain
//! immediately. Cancelling the token while waiting between attempts also
//! ends the chain with `Interrupted`.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::metrics::SyncMetrics;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default pause between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Retry budget for one remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts, including the first.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Longest time one call can block when every attempt takes `latency`
    /// and fails: `latency * (1 + max_retries) + delay * max_retries`.
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use floe_sync::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(2, Duration::from_secs(1));
    /// assert_eq!(
    ///     policy.worst_case_wait(Duration::from_millis(500)),
    ///     Duration::from_millis(3500),
    /// );
    /// ```
    #[must_use]
    pub fn worst_case_wait(&self, latency: Duration) -> Duration {
        latency
            .saturating_mul(self.attempts())
            .saturating_add(self.delay.saturating_mul(self.max_retries))
    }
}

/// Runs `op` until it succeeds or the retry budget is spent.
///
/// Returns the first success, or the error from the final attempt unchanged.
///
/// # Errors
///
/// - The last attempt's error once all attempts have failed.
/// - [`Error::Interrupted`] if `cancel` fires during a wait, or if `op`
///   itself returns `Interrupted`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_interrupted() || attempt >= attempts {
            return Err(err);
        }

        tracing::warn!(
            operation,
            attempt,
            max_attempts = attempts,
            delay_ms = u64::try_from(policy.delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "remote call failed, retrying"
        );
        SyncMetrics::new().record_retry(operation);

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(Error::Interrupted {
                    operation: operation.to_string(),
                });
            }
            () = tokio::time::sleep(policy.delay) => {}
        }
        attempt += 1;
    }
}
