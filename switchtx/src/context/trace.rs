//! Append-only checkpoint trace for observability.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A single checkpoint with its time relative to context creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The checkpoint label.
    pub label: String,
    /// Milliseconds elapsed since the trace started.
    pub elapsed_ms: u64,
}

/// A linear, append-only trace of checkpoints.
///
/// Used purely for observability; never persisted and never consulted by
/// control flow.
#[derive(Debug)]
pub struct TraceLog {
    start: Instant,
    checkpoints: RwLock<Vec<Checkpoint>>,
}

impl Default for TraceLog {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            checkpoints: RwLock::new(Vec::new()),
        }
    }
}

impl TraceLog {
    /// Creates a new empty trace starting now.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a checkpoint stamped with the elapsed time.
    pub fn checkpoint(&self, label: impl Into<String>) {
        let elapsed_ms = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.checkpoints.write().push(Checkpoint {
            label: label.into(),
            elapsed_ms,
        });
    }

    /// Returns a copy of all checkpoints in order.
    #[must_use]
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.checkpoints.read().clone()
    }

    /// Returns the number of checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    /// Returns true if no checkpoints have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }
}

impl Clone for TraceLog {
    fn clone(&self) -> Self {
        Self {
            start: self.start,
            checkpoints: RwLock::new(self.checkpoints.read().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_order() {
        let trace = TraceLog::new();
        trace.checkpoint("admitted");
        trace.checkpoint("prepared");

        let checkpoints = trace.checkpoints();
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[0].label, "admitted");
        assert_eq!(checkpoints[1].label, "prepared");
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let trace = TraceLog::new();
        trace.checkpoint("first");
        trace.checkpoint("second");

        let checkpoints = trace.checkpoints();
        assert!(checkpoints[0].elapsed_ms <= checkpoints[1].elapsed_ms);
    }

    #[test]
    fn test_empty() {
        let trace = TraceLog::new();
        assert!(trace.is_empty());
        assert_eq!(trace.len(), 0);
    }
}
