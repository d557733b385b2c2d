use std::{future::Future, num::NonZeroUsize, time::Duration};

use kube::Error as KubeError;
use tokio::time::sleep;
use tracing::debug;

mod api;
pub use api::ApiRetryExt;

/// How many times a call may be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Keep trying; the caller bounds the wait, e.g. with a shutdown signal.
    Unlimited,
    Finite(NonZeroUsize),
}

/// Backoff schedule for kube calls.
///
/// The default is short: access reviews run on every cached read and must not
/// stall it. [`RetryPolicy::persistent`] suits background work such as
/// discovery, which keeps trying until it succeeds or is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts including the first call.
    pub max_attempts: RetryLimit,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Growth of the wait after each failure; never below `1.0`.
    pub backoff_multiplier: f64,
    /// Decides whether a failed call is worth another attempt.
    pub is_retryable: fn(&KubeError) -> bool,
}

impl RetryPolicy {
    /// Retries transient failures forever, backing off up to 30 seconds.
    pub fn persistent() -> Self {
        Self {
            max_attempts: RetryLimit::Unlimited,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: NonZeroUsize) -> Self {
        self.max_attempts = RetryLimit::Finite(max_attempts);
        self
    }

    pub fn with_unlimited_attempts(mut self) -> Self {
        self.max_attempts = RetryLimit::Unlimited;
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RetryLimit::Finite(NonZeroUsize::MIN.saturating_add(2)),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            is_retryable: default_retryable_error,
        }
    }
}

/// Whether `error` looks transient.
///
/// Api errors are retried on `408`, `429` and `5xx` only. Transport and
/// decoding failures are always retried.
pub fn default_retryable_error(error: &KubeError) -> bool {
    match error {
        KubeError::Api(response) => matches!(response.code, 408 | 429 | 500..=599),
        _ => true,
    }
}

fn next_backoff(current: Duration, policy: &RetryPolicy) -> Duration {
    current
        .mul_f64(policy.backoff_multiplier.max(1.0))
        .min(policy.max_backoff)
}

/// Runs `operation` until it succeeds, fails for good or runs out of attempts.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, KubeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, KubeError>>,
{
    let mut backoff = policy.initial_backoff.min(policy.max_backoff);
    let mut attempts = 0usize;

    loop {
        attempts = attempts.saturating_add(1);
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        let exhausted = match policy.max_attempts {
            RetryLimit::Unlimited => false,
            RetryLimit::Finite(max) => attempts >= max.get(),
        };
        if exhausted || !(policy.is_retryable)(&error) {
            return Err(error);
        }
        debug!(%error, attempts, ?backoff, "retrying api call");
        sleep(backoff).await;
        backoff = next_backoff(backoff, policy);
    }
}
