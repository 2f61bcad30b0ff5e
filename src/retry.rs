//! Retry with exponential backoff and jitter.
//!
//! Many dishes are enriched concurrently, so a transient outage of the image
//! service hits several requests at the same moment. Plain exponential backoff
//! would make all of them retry in lock-step; a symmetric random jitter
//! spreads them out.
//!
//! The delay computation is a pure function of `(attempt, policy, jitter)` so
//! it can be checked without sleeping or touching the network.

use crate::error::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff parameters.
///
/// With the defaults the nominal waits are 1s and 2s between three attempts
/// (each ±25 %), capped at 30s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Default: 3.
    pub max_attempts: u32,
    /// Delay before the second attempt. Default: 1s.
    pub base_delay: Duration,
    /// Growth factor per attempt. Default: 2.0.
    pub multiplier: f64,
    /// Upper bound for any single delay. Default: 30s.
    pub max_delay: Duration,
    /// Symmetric jitter as a fraction of the nominal delay. Default: 0.25.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Nominal delay after failed attempt `attempt` (1-based), before jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Delay after failed attempt `attempt` with the given jitter sample.
    ///
    /// `unit` must lie in `[-1, 1]`; it scales the jitter band. The result is
    /// `min(max_delay, nominal * (1 + jitter * unit))`.
    pub fn delay_with_jitter(&self, attempt: u32, unit: f64) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let nominal = self.base_delay.as_secs_f64() * self.multiplier.powi(exp);
        let jittered = nominal * (1.0 + self.jitter * unit.clamp(-1.0, 1.0));
        Duration::from_secs_f64(jittered.max(0.0).min(self.max_delay.as_secs_f64()))
    }

    /// Delay after failed attempt `attempt`, with a fresh random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let unit = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with_jitter(attempt, unit)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
///
/// `op` receives the 1-based attempt number. Non-retryable errors are
/// returned as-is after the first failure; exhausting the attempts on
/// retryable errors yields [`ProviderError::RetriesExhausted`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                if max_attempts == 1 {
                    return Err(e);
                }
                return Err(ProviderError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:.1}s",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
