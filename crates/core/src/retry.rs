// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff with a bounded attempt count and deadline

use std::time::Duration;

/// Backoff schedule for retried deliveries
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
    pub deadline: Duration,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the delay
    RetryAfter(Duration),
    /// Attempt budget or deadline spent
    GiveUp,
}

impl Backoff {
    /// Delay before attempt `attempt + 1`, given `attempt` failures so far (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(scaled)
    }

    /// Decide whether to retry after `attempt` failures with `elapsed` since the first try
    pub fn next(&self, attempt: u32, elapsed: Duration) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let delay = self.delay_for(attempt);
        if elapsed + delay > self.deadline {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(delay)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(300),
            multiplier: 2.0,
            max_attempts: 8,
            deadline: Duration::from_secs(3600),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
