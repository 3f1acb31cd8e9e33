// Linear backoff schedule with a hard attempt ceiling
use std::time::Duration;

use crate::error::CommonError;
use crate::retry::constants::{
    DEFAULT_INCREMENT, DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_ATTEMPTS, MAX_MAX_ATTEMPTS,
    MIN_MAX_ATTEMPTS,
};
use crate::retry::error::RetryResult;

/// Answer returned by [`BackoffPolicy::next_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long before the next attempt.
    Delay(Duration),
    /// The attempt ceiling is reached; surface the last error.
    Stop,
}

/// Immutable description of a backoff schedule.
///
/// Cheap to copy and safe to share; call [`BackoffConfig::policy`] to get the
/// stateful generator for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    initial_interval: Duration,
    increment: Duration,
    max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            increment: DEFAULT_INCREMENT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffConfig {
    /// Create a validated schedule description.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `max_attempts` is outside
    /// `1..=100`.
    pub fn new(initial_interval: Duration, increment: Duration, max_attempts: u32) -> RetryResult<Self> {
        if !(MIN_MAX_ATTEMPTS..=MAX_MAX_ATTEMPTS).contains(&max_attempts) {
            return Err(CommonError::config_field(
                "max_attempts",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_MAX_ATTEMPTS, MAX_MAX_ATTEMPTS, max_attempts
                ),
            )
            .into());
        }

        Ok(Self { initial_interval, increment, max_attempts })
    }

    /// Build a fresh policy in the idle state.
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_interval: self.initial_interval,
            increment: self.increment,
            current_interval: None,
            max_attempts: self.max_attempts,
            attempt_count: 0,
        }
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn increment(&self) -> Duration {
        self.increment
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Stateful, bounded retry-interval generator.
///
/// The first call returns the initial interval unchanged; each later call
/// adds the increment to the previous interval. After `max_attempts` calls
/// the policy answers [`Backoff::Stop`] until [`BackoffPolicy::reset`].
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial_interval: Duration,
    increment: Duration,
    current_interval: Option<Duration>,
    max_attempts: u32,
    attempt_count: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffConfig::default().policy()
    }
}

impl BackoffPolicy {
    /// Shorthand for `BackoffConfig::new(..)?.policy()`.
    ///
    /// # Errors
    ///
    /// See [`BackoffConfig::new`].
    pub fn new(initial_interval: Duration, increment: Duration, max_attempts: u32) -> RetryResult<Self> {
        Ok(BackoffConfig::new(initial_interval, increment, max_attempts)?.policy())
    }

    /// Advance the schedule after a failure.
    pub fn next_backoff(&mut self) -> Backoff {
        if self.attempt_count >= self.max_attempts {
            return Backoff::Stop;
        }
        self.attempt_count += 1;

        let next = match self.current_interval {
            None => self.initial_interval,
            Some(current) => current.saturating_add(self.increment),
        };
        self.current_interval = Some(next);
        Backoff::Delay(next)
    }

    /// Return to the idle state.
    pub fn reset(&mut self) {
        self.current_interval = None;
        self.attempt_count = 0;
    }

    /// Number of delays handed out since creation or the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}
