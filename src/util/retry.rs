//! Retry decisions with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;

use crate::error::{ClassifiedError, ErrorKind};

/// Delay used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryNow,
    RetryAfter(Duration),
    GiveUp,
}

impl RetryDecision {
    /// Delay before the next attempt, `None` when giving up.
    pub fn delay(self) -> Option<Duration> {
        match self {
            Self::RetryNow => Some(Duration::ZERO),
            Self::RetryAfter(delay) => Some(delay),
            Self::GiveUp => None,
        }
    }
}

/// Retry policy configuration.
///
/// The attempt budget covers one logical operation: a single `execute` call
/// makes at most `max_retries + 1` HTTP attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for backoff plus jitter.
    pub max_backoff: Duration,
    /// Jitter is drawn from `[0, jitter_ratio * backoff)`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(60_000),
            jitter_ratio: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Same backoff shape, zero retries.
    pub fn without_retries(&self) -> Self {
        Self {
            max_retries: 0,
            ..self.clone()
        }
    }

    /// Decide what to do after attempt number `attempt` (0-based) failed.
    pub fn decide(&self, error: &ClassifiedError, attempt: u32) -> RetryDecision {
        self.decide_with_jitter(error, attempt, rand::thread_rng().gen::<f64>())
    }

    /// Pure variant of [`decide`](Self::decide); `jitter_sample` is in `[0, 1)`.
    pub fn decide_with_jitter(
        &self,
        error: &ClassifiedError,
        attempt: u32,
        jitter_sample: f64,
    ) -> RetryDecision {
        if !error.is_retryable() || attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }

        let delay = match error.kind {
            // Provider-supplied delay is exact: no jitter, no cap.
            ErrorKind::RateLimit => Duration::from_secs(
                error.retry_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            ),
            _ => self.backoff(attempt, jitter_sample),
        };

        if delay.is_zero() {
            RetryDecision::RetryNow
        } else {
            RetryDecision::RetryAfter(delay)
        }
    }

    /// `min(initial * 2^attempt + jitter, max_backoff)`.
    pub fn backoff(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let exponent = i32::try_from(attempt.min(31)).unwrap_or(31);
        let backoff = self.initial_backoff.as_secs_f64() * 2f64.powi(exponent);
        let jitter = backoff * self.jitter_ratio.max(0.0) * jitter_sample.clamp(0.0, 1.0);
        let capped = (backoff + jitter).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}
