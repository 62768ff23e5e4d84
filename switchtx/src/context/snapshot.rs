//! Durable serialization of a context's persistent subset.

use super::entries::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One persisted entry, in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// The entry key.
    pub key: String,
    /// The entry value.
    pub value: serde_json::Value,
}

/// The durable form of a context: the persistent entries only.
///
/// A snapshot written to the recovery store under transaction id `N` must be
/// reproducible from that store alone, so a cold-started engine can resume
/// `N` without cooperation from the process that created it. Serialization
/// is deterministic: entries are kept as an ordered list, so encoding the
/// same snapshot twice yields the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    /// Correlation id carried over from the originating context.
    pub correlation_id: Uuid,
    /// Creation instant of the originating context.
    pub created_at: DateTime<Utc>,
    /// The persistent entries in insertion order.
    #[serde(default)]
    pub entries: Vec<SnapshotEntry>,
}

impl ContextSnapshot {
    /// Encodes the snapshot for the recovery store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a snapshot previously produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Rebuilds a live context from this snapshot.
    ///
    /// Every restored entry is persistent; volatile state from the original
    /// context does not reappear. The transaction id is not part of the
    /// snapshot body (the store key carries it) and must be re-assigned by
    /// the engine.
    #[must_use]
    pub fn restore(&self) -> Context {
        Context::from_snapshot_parts(
            self.correlation_id,
            self.created_at,
            self.entries.clone(),
        )
    }

    /// Returns the value of a persisted entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }
}
