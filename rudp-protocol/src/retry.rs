//! Retransmission retry policy
//!
//! Every retransmission loop and idle receive loop consults a [`Retry`]
//! tracker. The default policy never gives up.

use std::time::{Duration, Instant};
use thiserror::Error;

/// Bounds on how long a retransmission loop may run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, unlimited if `None`
    pub max_attempts: Option<u32>,
    /// Maximum wall time since the first attempt, unlimited if `None`
    pub max_duration: Option<Duration>,
}

impl RetryPolicy {
    /// Retry without bound
    pub fn forever() -> Self {
        RetryPolicy::default()
    }

    /// Give up after `n` attempts
    pub fn attempts(n: u32) -> Self {
        RetryPolicy {
            max_attempts: Some(n),
            max_duration: None,
        }
    }

    /// Give up once `duration` has elapsed
    pub fn within(duration: Duration) -> Self {
        RetryPolicy {
            max_attempts: None,
            max_duration: Some(duration),
        }
    }

    /// Add an attempt bound
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Add a duration bound
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some() || self.max_duration.is_some()
    }

    /// Start tracking a new retransmission loop
    pub fn start(&self) -> Retry {
        Retry {
            policy: *self,
            attempts: 0,
            started: Instant::now(),
        }
    }
}

/// Retry budget ran out
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Gave up after {attempts} attempts in {elapsed:?}")]
pub struct RetryExhausted {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Attempt tracker for one loop
#[derive(Debug, Clone)]
pub struct Retry {
    policy: RetryPolicy,
    attempts: u32,
    started: Instant,
}

impl Retry {
    /// Record an attempt, failing if the policy forbids it
    pub fn attempt(&mut self) -> Result<(), RetryExhausted> {
        let elapsed = self.started.elapsed();
        let over_attempts = self
            .policy
            .max_attempts
            .map_or(false, |max| self.attempts >= max);
        let over_time = self
            .policy
            .max_duration
            .map_or(false, |max| self.attempts > 0 && elapsed >= max);

        if over_attempts || over_time {
            return Err(RetryExhausted {
                attempts: self.attempts,
                elapsed,
            });
        }
        self.attempts += 1;
        Ok(())
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
