//! Retry policy for participants returning a retry result.
//!
//! Unbounded retry is a liveness hazard: the bound converts a participant
//! stuck on retry into an aborted transaction instead of looping forever.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry with a jittered delay between attempts.
///
/// The bound applies per participant per attempt at the chain position; a
/// fresh budget is available each time the chain reaches a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum re-invocations of a single participant's prepare.
    pub max_retries: u32,
    /// Base delay between re-invocations in milliseconds.
    pub delay_ms: u64,
    /// Randomize each delay from 0 to `delay_ms` to avoid lockstep retries.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay_ms: 50,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry bound.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Disables jitter, making every delay exactly `delay_ms`.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Returns true once the attempt budget is spent.
    #[must_use]
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_retries
    }

    /// Returns the delay to sleep before the next attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        let millis = if self.jitter && self.delay_ms > 0 {
            rand::thread_rng().gen_range(0..=self.delay_ms)
        } else {
            self.delay_ms
        };
        Duration::from_millis(millis)
    }
}
