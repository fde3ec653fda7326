//! Deadline and retry combinators for catalog calls

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Result of one attempt raced against its deadline
#[derive(Debug)]
pub enum CallOutcome<T, E> {
    Ok(T),
    Timeout,
    Err(E),
}

impl<T, E> CallOutcome<T, E> {
    pub fn ok(self) -> Option<T> {
        match self {
            CallOutcome::Ok(value) => Some(value),
            CallOutcome::Timeout | CallOutcome::Err(_) => None,
        }
    }
}

/// Run `operation` until it completes or `deadline` elapses
///
/// The future is dropped on timeout, which cancels the underlying request.
pub async fn with_deadline<T, E, F>(deadline: Duration, operation: F) -> CallOutcome<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(deadline, operation).await {
        Ok(Ok(value)) => CallOutcome::Ok(value),
        Ok(Err(e)) => CallOutcome::Err(e),
        Err(_) => CallOutcome::Timeout,
    }
}

/// Fixed-delay retry policy with a hard per-attempt timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub retry_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        }
    }
}

impl RetryPolicy {
    /// Policy without delays, used where callers control timing themselves
    pub fn immediate(max_attempts: u32, call_timeout: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            call_timeout,
        }
    }

    /// Run `operation` with retries
    ///
    /// Returns `None` once all attempts failed or timed out; callers treat
    /// that as "no data for this call" rather than a fatal error.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Option<T>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                warn!("Retry {} for {}", attempt, label);
                sleep(self.retry_delay).await;
            } else {
                sleep(self.initial_delay).await;
            }

            match with_deadline(self.call_timeout, operation()).await {
                CallOutcome::Ok(value) => {
                    debug!("{} succeeded after {} attempt(s)", label, attempt + 1);
                    return Some(value);
                }
                CallOutcome::Timeout => {
                    warn!("Request for {} timed out after {:?}", label, self.call_timeout)
                }
                CallOutcome::Err(e) => warn!("Request for {} failed: {}", label, e),
            }
        }

        warn!("Giving up on {} after {} attempts", label, self.max_attempts);
        None
    }
}
