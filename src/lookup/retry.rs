//! Bounded retry with exponential backoff, expressed as a state machine.

use std::time::Duration;

use super::LookupError;

/// Default number of attempts per search term.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Retry limits and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Where a lookup is in its retry cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState<T> {
    /// About to send attempt `n`, counting from 1.
    Attempting(u32),
    /// Attempt `attempt` failed and the next one starts after `delay`.
    Backoff { attempt: u32, delay: Duration },
    Failed(LookupError),
    Succeeded(T),
}

impl<T> RetryState<T> {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Succeeded(_))
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Delay after failed attempt `attempt`: `base * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(exponent))
            .min(self.max_delay)
    }

    /// State after attempt `attempt` produced `outcome`.
    pub fn next<T>(&self, attempt: u32, outcome: Result<T, LookupError>) -> RetryState<T> {
        match outcome {
            Ok(value) => RetryState::Succeeded(value),
            Err(error) if !error.is_retryable() || attempt >= self.max_attempts.max(1) => RetryState::Failed(error),
            Err(_) => RetryState::Backoff {
                attempt,
                delay: self.backoff_delay(attempt),
            },
        }
    }

    /// State following a finished backoff.
    #[must_use]
    pub const fn resume<T>(attempt: u32) -> RetryState<T> {
        RetryState::Attempting(attempt + 1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}
