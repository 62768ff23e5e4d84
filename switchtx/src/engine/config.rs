//! Engine configuration.

use super::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Configuration for a [`TxEngine`](super::TxEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of worker tasks dequeuing and driving transactions.
    pub workers: usize,
    /// Policy applied when a participant asks to be re-run.
    pub retry: RetryPolicy,
    /// How many times a failed recovery-store write is re-attempted before
    /// the transaction is abandoned to the next recovery pass.
    pub store_write_retries: u32,
    /// Delay between recovery-store write attempts, in milliseconds.
    pub store_retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            store_write_retries: 3,
            store_retry_delay_ms: 25,
        }
    }
}

impl EngineConfig {
    /// Creates a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the participant retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the recovery-store write retry bound.
    #[must_use]
    pub fn with_store_write_retries(mut self, retries: u32) -> Self {
        self.store_write_retries = retries;
        self
    }

    /// Sets the delay between recovery-store write attempts.
    #[must_use]
    pub fn with_store_retry_delay_ms(mut self, delay: u64) -> Self {
        self.store_retry_delay_ms = delay;
        self
    }
}
