//! Caller-side policies wrapped around a [`LanguageModel`]: bounded retry
//! with exponential backoff, and a per-call timeout.
//!
//! Backends never retry on their own. A caller that wants retries wraps its
//! client in [`RetryingModel`]; one that wants a latency bound wraps it in
//! [`TimeoutModel`]. Both are themselves `LanguageModel`s.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ModelError, Result};
use crate::model::LanguageModel;

/// How transient failures are retried.
///
/// Only [`ModelError::RateLimited`] and [`ModelError::BackendUnavailable`]
/// are retried. The delay starts at `initial_backoff_ms`, doubles after each
/// attempt and never exceeds `max_backoff_ms`; a `Retry-After` hint from the
/// backend replaces the computed delay (still capped).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 0, initial_backoff_ms: 500, max_backoff_ms: 8_000 }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self::default()
    }

    /// Delay before retry number `retry` (zero-based), ignoring any hint.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.min(63)).unwrap_or(u64::MAX);
        let millis = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    fn delay_for(&self, retry: u32, error: &ModelError) -> Duration {
        let cap = Duration::from_millis(self.max_backoff_ms);
        error.retry_after().map(|hint| hint.min(cap)).unwrap_or_else(|| self.backoff(retry))
    }
}

/// Retries transient failures of the wrapped model according to a [`RetryPolicy`].
pub struct RetryingModel<M> {
    inner: M,
    policy: RetryPolicy,
}

impl<M: LanguageModel> RetryingModel<M> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: M, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped model.
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for RetryingModel<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut retry = 0;
        loop {
            match self.inner.generate(prompt).await {
                Ok(answer) => return Ok(answer),
                Err(err) if err.is_transient() && retry < self.policy.max_retries => {
                    let delay = self.policy.delay_for(retry, &err);
                    warn!(
                        model = self.inner.name(),
                        retry = retry + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "generation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Fails a call with [`ModelError::BackendUnavailable`] if it takes longer than `timeout`.
pub struct TimeoutModel<M> {
    inner: M,
    timeout: Duration,
}

impl<M: LanguageModel> TimeoutModel<M> {
    /// Wrap `inner` with a per-call `timeout`.
    pub fn new(inner: M, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for TimeoutModel<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        tokio::time::timeout(self.timeout, self.inner.generate(prompt)).await.map_err(|_| {
            ModelError::BackendUnavailable {
                backend: self.inner.name().to_string(),
                message: format!("no response within {:?}", self.timeout),
            }
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_retries: 5, initial_backoff_ms: 500, max_backoff_ms: 3_000 };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(3_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(3_000));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(3_000));
    }

    #[test]
    fn retry_after_hint_wins_but_is_capped() {
        let policy = RetryPolicy { max_retries: 1, initial_backoff_ms: 100, max_backoff_ms: 5_000 };
        let hinted = ModelError::RateLimited {
            backend: "openai".into(),
            message: "".into(),
            retry_after: Some(Duration::from_secs(60)),
        };
        assert_eq!(policy.delay_for(0, &hinted), Duration::from_secs(5));
    }
}
