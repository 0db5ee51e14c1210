//! Retry bookkeeping for transient failures.
//!
//! A failed attempt is counted before the decision is made, so an operation
//! with `max_attempts = n` gets exactly `n` attempts and lands in `failed`
//! with `attempt_count == n`.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with an operation after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum RetryDecision {
    /// Return to `pending`; not due again before `next_attempt_at`.
    #[serde(rename_all = "camelCase")]
    Retry {
        attempt: u32,
        next_attempt_at: Timestamp,
    },
    /// Attempt budget spent; move to `failed`.
    Exhausted { attempt: u32 },
}

impl RetryDecision {
    /// The attempt count to record.
    pub fn attempt(&self) -> u32 {
        match self {
            RetryDecision::Retry { attempt, .. } | RetryDecision::Exhausted { attempt } => *attempt,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryDecision::Exhausted { .. })
    }
}

/// Exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay before the next attempt after `attempt` failures (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Decide the fate of an operation that just failed its attempt.
    pub fn decide(&self, attempt_count: u32, max_attempts: u32, now: Timestamp) -> RetryDecision {
        let attempt = attempt_count.saturating_add(1).min(max_attempts);
        if attempt >= max_attempts {
            return RetryDecision::Exhausted { attempt };
        }

        let delay = u64::try_from(self.backoff(attempt).as_millis()).unwrap_or(u64::MAX);
        RetryDecision::Retry {
            attempt,
            next_attempt_at: now.saturating_add(delay),
        }
    }
}
