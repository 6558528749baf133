//! Bounded retry with exponential backoff for a single provider.
//! Backoff waits are interruptible by the request's cancellation token.

use super::ProviderError;
use crate::types::RetryPolicy;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct RetryHandler {
    policy: RetryPolicy,
}

impl RetryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Wait after failed attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)` when exponential, else `base`; capped at `timeout_ms`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.policy.base_delay_ms;
        let raw = if self.policy.exponential {
            let shift = attempt.saturating_sub(1);
            1u64.checked_shl(shift)
                .map(|factor| base.saturating_mul(factor))
                .unwrap_or(u64::MAX)
        } else {
            base
        };
        Duration::from_millis(raw.min(self.policy.timeout_ms))
    }

    /// Whether a failure on `attempt` earns another try.
    pub fn should_retry(&self, err: &ProviderError, attempt: u32, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() || attempt >= self.policy.max_attempts.max(1) {
            return false;
        }
        err.is_retryable()
    }

    /// Run `op` (given the 1-based attempt number) until it succeeds or the
    /// policy gives up, returning the last error in the latter case.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !self.should_retry(&err, attempt, cancel) {
                return Err(err);
            }

            let wait = self.backoff_delay(attempt);
            tracing::debug!(
                "Attempt {}/{} failed ({}), retrying in {}ms",
                attempt,
                self.policy.max_attempts,
                err,
                wait.as_millis()
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
