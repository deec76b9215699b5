//! Bounded retry with exponential backoff.
//!
//! delay(attempt) = min(base * 2^(attempt-1), max_delay), with optional
//! jitter of +/-10% that never exceeds `max_delay`. At most
//! `max_attempts - 1` sleeps happen, so the cumulative wait is bounded by
//! `(max_attempts - 1) * max_delay`. A deadline, when given, stops retries
//! before a sleep would cross it.

use crate::domain::error::{PulseError, ServiceError};
use crate::ports::clock_port::Clock;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
const JITTER_RANGE: f64 = 0.1;

/// Failure classification used by [`RetryPolicy::execute`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ServiceError {
    fn is_retryable(&self) -> bool {
        ServiceError::is_retryable(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Attempts beyond the first.
    pub retries: u32,
    pub total_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError<E> {
    #[error("non-retryable failure on attempt {attempts}: {error}")]
    NonRetryable { attempts: u32, error: E },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("deadline exceeded after {attempts} attempts: {last}")]
    DeadlineExceeded { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::NonRetryable { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }
}

impl From<RetryError<ServiceError>> for PulseError {
    fn from(err: RetryError<ServiceError>) -> Self {
        match err {
            RetryError::NonRetryable { error, .. } => PulseError::Transport(error),
            RetryError::Exhausted { attempts, last } => PulseError::RetryExhausted { attempts, last },
            RetryError::DeadlineExceeded { attempts, last } => {
                PulseError::DeadlineExceeded { attempts, last }
            }
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let seconds = self.base_delay.as_secs_f64() * 2f64.powi(exponent);
        Duration::from_secs_f64(seconds.min(self.max_delay.as_secs_f64()))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let factor = 1.0 + (fastrand::f64() * 2.0 - 1.0) * JITTER_RANGE;
        delay.mul_f64(factor).min(self.max_delay)
    }

    /// Upper bound on the sum of all backoff sleeps.
    pub fn max_cumulative_delay(&self) -> Duration {
        self.max_delay * self.max_attempts.max(1).saturating_sub(1)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, runs
    /// out of attempts, or would have to sleep past `deadline`. `op`
    /// receives the 1-based attempt number.
    pub fn execute<T, E, F>(
        &self,
        clock: &dyn Clock,
        deadline: Option<Instant>,
        mut op: F,
    ) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        E: Retryable + fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(RetryOutcome {
                        value,
                        retries: attempt - 1,
                        total_delay,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    warn!(attempt, error = %e, "non-retryable failure");
                    return Err(RetryError::NonRetryable {
                        attempts: attempt,
                        error: e,
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(attempt, error = %e, "retries exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.jittered(self.delay_for(attempt));
                    if let Some(deadline) = deadline {
                        if clock.now() + delay > deadline {
                            warn!(attempt, error = %e, "deadline reached, not retrying");
                            return Err(RetryError::DeadlineExceeded {
                                attempts: attempt,
                                last: e,
                            });
                        }
                    }
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retryable failure, backing off"
                    );
                    clock.sleep(delay);
                    total_delay += delay;
                    attempt += 1;
                }
            }
        }
    }
}
