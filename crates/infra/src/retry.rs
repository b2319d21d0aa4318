//! Bounded retry for optimistic-concurrency conflicts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy for row-version conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt hit a retryable conflict.
    Exhausted { attempts: u32, last: E },
    /// A non-retryable error; returned as soon as it happened.
    Failed(E),
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay before retrying after failed attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => (base_ms * 2_f64.powi((attempt - 1) as i32)).min(max_ms),
            BackoffStrategy::Linear => (base_ms * attempt as f64).min(max_ms),
        };

        // Deterministic jitter based on attempt.
        let jitter_range = delay_ms * self.jitter.clamp(0.0, 1.0);
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub fn run<T, E, F, R>(&self, mut op: F, retryable: R) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: core::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) => {
                    if !self.should_retry(attempt) {
                        return Err(RetryError::Exhausted { attempts: attempt, last: e });
                    }
                    let delay = self.delay_for_attempt(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying after conflict");
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(RetryError::Failed(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delays_are_capped() {
        let p = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::exponential(5, Duration::from_millis(10), Duration::from_millis(30))
        };
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(30));
        assert_eq!(p.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn run_gives_up_after_budget() {
        let p = RetryPolicy::fixed(3, Duration::ZERO);
        let mut calls = 0;
        let out: Result<(), _> = p.run(
            |_| {
                calls += 1;
                Err::<(), _>("conflict")
            },
            |_| true,
        );
        assert_eq!(out, Err(RetryError::Exhausted { attempts: 3, last: "conflict" }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn run_stops_on_non_retryable_error() {
        let p = RetryPolicy::fixed(3, Duration::ZERO);
        let out: Result<(), _> = p.run(|_| Err::<(), _>("invalid"), |e| *e == "conflict");
        assert_eq!(out, Err(RetryError::Failed("invalid")));
    }

    #[test]
    fn run_succeeds_after_transient_conflict() {
        let p = RetryPolicy::fixed(3, Duration::ZERO);
        let out = p.run(
            |attempt| if attempt < 2 { Err("conflict") } else { Ok(attempt) },
            |_| true,
        );
        assert_eq!(out, Ok(2));
    }
}
