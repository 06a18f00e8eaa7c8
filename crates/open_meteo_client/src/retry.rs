//! Bounded retry around a [`WeatherSource`].
//!
//! Only `Timeout` and `RateLimited` are retried:
//!
//! - `RateLimited` waits the provider's hint, capped at
//!   [`RetryPolicy::max_retry_after`].
//! - `Timeout` waits `2^attempt` seconds (2s, 4s, ...).
//! - `UpstreamError` and `NetworkError` return on the first occurrence.
//!   A malformed request or a DNS failure will not fix itself within one
//!   request, and retrying would only spend quota.
//!
//! With the defaults (2 retries, 30s per attempt, 60s rate-limit cap) a
//! caller can wait up to `3 × 30s + 60s + 60s = 210s`; see
//! [`RetryPolicy::worst_case_latency`].

use std::time::Duration;

use common::config::FetchConfig;
use common::{Coordinates, WeatherObservation};
use tracing::{debug, info, warn};

use crate::{FetchFailure, WeatherSource};

/// Largest exponent used for timeout backoff.
const MAX_BACKOFF_EXPONENT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
    /// Upper bound on a rate-limit wait.
    pub max_retry_after: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            attempt_timeout: config.timeout(),
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
        }
    }

    /// Delay before the attempt following `attempt` (1-based), or `None`
    /// when the failure is not worth retrying.
    pub fn backoff_for(&self, failure: &FetchFailure, attempt: u32) -> Option<Duration> {
        match failure {
            FetchFailure::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs).min(self.max_retry_after))
            }
            FetchFailure::Timeout => Some(timeout_backoff(attempt)),
            FetchFailure::UpstreamError { .. } | FetchFailure::NetworkError(_) => None,
        }
    }

    /// Longest a caller can wait for [`RetryingFetcher::fetch`] to return:
    /// every attempt runs to its timeout and every gap takes the longer of
    /// the two backoff strategies.
    /// Saturates at [`Duration::MAX`].
    pub fn worst_case_latency(&self) -> Duration {
        let gap = |attempt: u32| timeout_backoff(attempt).max(self.max_retry_after);

        // Gaps past the backoff cap are all the same length.
        let growing = self.max_retries.min(MAX_BACKOFF_EXPONENT);
        let flat = self.max_retries - growing;
        let backoff = (1..=growing)
            .map(gap)
            .fold(Duration::ZERO, Duration::saturating_add)
            .saturating_add(saturating_mul(gap(MAX_BACKOFF_EXPONENT), flat));

        let attempts = self.max_retries.saturating_add(1);
        saturating_mul(self.attempt_timeout, attempts).saturating_add(backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

fn saturating_mul(d: Duration, n: u32) -> Duration {
    d.checked_mul(n).unwrap_or(Duration::MAX)
}

fn timeout_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(MAX_BACKOFF_EXPONENT))
}

/// Wraps a single-shot source with [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryingFetcher<S> {
    source: S,
    policy: RetryPolicy,
}

impl<S: WeatherSource> RetryingFetcher<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch current conditions, retrying transient failures.
    ///
    /// On exhaustion the last failure is returned unchanged, so a
    /// rate-limit hint survives for the caller to surface.
    pub async fn fetch(&self, coords: Coordinates) -> Result<WeatherObservation, FetchFailure> {
        let max_attempts = self.policy.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.source.current(coords),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(FetchFailure::Timeout),
            };

            let failure = match result {
                Ok(observation) => {
                    if attempt > 1 {
                        info!("Weather fetch succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(observation);
                }
                Err(failure) => failure,
            };

            if attempt >= max_attempts {
                warn!(
                    "Weather fetch failed after {} attempts ({}): {}",
                    attempt,
                    failure.kind(),
                    failure
                );
                return Err(failure);
            }

            let Some(delay) = self.policy.backoff_for(&failure, attempt) else {
                debug!("Not retrying {} failure: {}", failure.kind(), failure);
                return Err(failure);
            };

            warn!(
                "Weather fetch attempt {}/{} failed ({}), retrying in {:?}",
                attempt,
                max_attempts,
                failure.kind(),
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
