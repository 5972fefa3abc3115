//! Bounded retry with backoff.
//!
//! # Retryable Errors
//!
//! | Retryable | Non-Retryable |
//! |-----------|---------------|
//! | Dependency unavailable | Validation failure |
//! | Dependency timeout | Resource not found |
//! | Circuit open | Business-rule violation |
//! | | Compensation failure |
//!
//! The backoff before retry `n` (zero-based) is `min(base * 2^n, max)` for the
//! default exponential strategy. Waiting never holds a lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use transfer_engine::resilience::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! let balance = policy.execute(|| ledger.get_balance(&account)).await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Classify;
use crate::observability::metrics;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * 2^attempt`.
    #[default]
    Exponential,
    /// `base * (attempt + 1)`.
    Linear,
    /// Always `base`.
    Fixed,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3).
    pub max_retries: u32,
    /// Delay before the first retry (default: 1s).
    pub base_delay: Duration,
    /// Upper bound on any single delay (default: 60s).
    pub max_delay: Duration,
    /// Delay growth (default: exponential).
    pub strategy: BackoffStrategy,
    /// Jitter factor for randomization (default: 0.0, no jitter).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Create an exponential policy without jitter.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter_factor: 0.0,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Set the backoff strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the jitter factor (clamped to `0.0..=1.0`).
    #[must_use]
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after the failed attempt `attempt` (zero-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Exponential => self
                .base_delay
                .checked_mul(2_u32.checked_pow(attempt).unwrap_or(u32::MAX))
                .unwrap_or(self.max_delay),
            BackoffStrategy::Linear => self
                .base_delay
                .checked_mul(attempt.saturating_add(1))
                .unwrap_or(self.max_delay),
            BackoffStrategy::Fixed => self.base_delay,
        };
        let capped = base.min(self.max_delay);
        if self.jitter_factor > 0.0 {
            self.apply_jitter(capped).min(self.max_delay)
        } else {
            capped
        }
    }

    /// Apply jitter: random value in `[d * (1 - jitter), d * (1 + jitter)]`.
    fn apply_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::rng();
        let millis = delay.as_millis() as f64;
        let range = millis * self.jitter_factor;
        let min = (millis - range).max(0.0);
        let max = millis + range;
        if max <= min {
            return delay;
        }
        Duration::from_millis(rng.random_range(min..=max) as u64)
    }

    /// Run `operation`, retrying failures the error type classifies as transient.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        self.execute_with(operation, E::is_transient).await
    }

    /// Run `operation`, retrying failures for which `is_transient` holds.
    ///
    /// A non-transient failure is returned at once. After `max_retries`
    /// retries the last transient failure is returned, so an operation that
    /// always fails transiently is invoked exactly `max_retries + 1` times.
    pub async fn execute_with<T, E, F, Fut, C>(&self, mut operation: F, is_transient: C) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        C: Fn(&E) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            let result = operation().await;
            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !is_transient(&error) => {
                    tracing::debug!(attempt, error = %error, "Non-retryable failure");
                    return Err(error);
                }
                Err(error) if attempt >= self.max_retries => {
                    metrics::record_retry_exhausted();
                    tracing::warn!(
                        attempts = attempt + 1,
                        error = %error,
                        "Retries exhausted"
                    );
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.delay_for_attempt(attempt);
                    metrics::record_retry_attempt(attempt, delay.as_secs_f64());
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
