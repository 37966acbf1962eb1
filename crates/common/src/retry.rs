//! Retry policies.
//!
//! A [`RetryPolicy`] bounds how often a queued job runs, how long each run may
//! take and how long to wait between runs. The job runner asks the policy for a
//! [`RetryDecision`] after every failed run. [`retry_with_backoff`] applies the
//! same policy inline to an async operation such as opening a connection.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Wait between two runs of the same job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed(Duration),
    /// `initial * multiplier^(retry - 1)`, capped at `max`
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = retry.saturating_sub(1) as i32;
                let delay_ms = initial.as_millis() as f64 * multiplier.powi(exponent);
                Duration::from_millis(delay_ms.min(max.as_millis() as f64) as u64)
            }
        }
    }
}

/// Retry policy of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total runs allowed, the first one included
    pub max_attempts: u32,

    /// Wait between runs
    pub backoff: Backoff,

    /// Wall-clock limit of a single run
    pub timeout: Option<Duration>,

    /// Failures raised by the job itself (timeouts excluded) after which it
    /// fails outright, whatever attempts remain
    pub max_exceptions: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(10)),
            timeout: None,
            max_exceptions: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
            timeout: None,
            max_exceptions: None,
        }
    }

    /// Exponential policy doubling from `initial`, capped at 5 minutes
    pub fn exponential(max_attempts: u32, initial: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                initial,
                multiplier: 2.0,
                max: Duration::from_secs(300),
            },
            timeout: None,
            max_exceptions: None,
        }
    }

    /// A single run, no retries
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Set the per-run timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the exception cap
    pub fn with_max_exceptions(mut self, max_exceptions: u32) -> Self {
        self.max_exceptions = Some(max_exceptions);
        self
    }

    /// Decide what happens after a failed run.
    ///
    /// `attempts_made` counts every run so far, the failed one included;
    /// `exceptions` counts the runs that failed with an error of their own.
    pub fn decide(&self, attempts_made: u32, exceptions: u32) -> RetryDecision {
        if let Some(max_exceptions) = self.max_exceptions {
            if exceptions >= max_exceptions {
                return RetryDecision::GiveUp(GiveUpReason::ExceptionLimit);
            }
        }

        if attempts_made >= self.max_attempts {
            return RetryDecision::GiveUp(GiveUpReason::AttemptsExhausted);
        }

        RetryDecision::RetryAfter(self.backoff.delay_for(attempts_made))
    }
}

/// Outcome of [`RetryPolicy::decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again after the delay
    RetryAfter(Duration),
    /// Fail the job for good
    GiveUp(GiveUpReason),
}

/// Why a job was given up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    AttemptsExhausted,
    ExceptionLimit,
}

impl std::fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttemptsExhausted => write!(f, "attempts exhausted"),
            Self::ExceptionLimit => write!(f, "exception limit reached"),
        }
    }
}

/// Retry an async operation under a policy.
///
/// The per-run timeout and exception cap are not applied here; every failure
/// counts as an attempt.
///
/// # Examples
///
/// ```no_run
/// use lms_pipeline_common::retry::{retry_with_backoff, RetryPolicy};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let policy = RetryPolicy::exponential(3, Duration::from_millis(100));
///
///     let result = retry_with_backoff(policy, || async {
///         Ok::<_, std::io::Error>(())
///     }).await;
/// }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempts += 1;

                match policy.decide(attempts, 0) {
                    RetryDecision::GiveUp(_) => return Err(error),
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying operation after error"
                        );
                        sleep(delay).await;
                    }
                }
            }
        }
    }
}
