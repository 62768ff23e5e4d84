//! The thread-safe, insertion-ordered entry map behind [`Context`].

use super::snapshot::{ContextSnapshot, SnapshotEntry};
use super::trace::{Checkpoint, TraceLog};
use super::TxId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// A single context entry with its durability flag.
#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    persistent: bool,
}

/// Insertion-ordered map from keys to entries.
///
/// Overwriting an existing key keeps its original position; new keys are
/// appended.
#[derive(Debug, Clone, Default)]
struct EntryMap {
    order: Vec<String>,
    map: HashMap<String, Entry>,
}

impl EntryMap {
    fn insert(&mut self, key: String, value: serde_json::Value, persistent: bool) {
        if !self.map.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.map.insert(key, Entry { value, persistent });
    }

    fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        let removed = self.map.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed.value)
    }

    fn ordered(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.order.iter().filter_map(|k| self.map.get(k).map(|e| (k, e)))
    }
}

/// The mutable per-transaction state container.
///
/// An ordered mapping from string keys to JSON values, where each entry is
/// either *volatile* (memory only, dropped by every snapshot) or
/// *persistent* (included in every durable snapshot and every recovered
/// copy). The context also accumulates an append-only checkpoint trace used
/// purely for observability.
///
/// The engine owns the context for the duration of processing; participants
/// receive `&Context` and mutate it through these methods. One worker
/// touches a given context at a time, so the internal locks are
/// uncontended on the hot path.
#[derive(Debug)]
pub struct Context {
    correlation_id: Uuid,
    created_at: DateTime<Utc>,
    tx_id: RwLock<Option<TxId>>,
    entries: RwLock<EntryMap>,
    trace: TraceLog,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            created_at: Utc::now(),
            tx_id: RwLock::new(None),
            entries: RwLock::new(EntryMap::default()),
            trace: TraceLog::new(),
        }
    }
}

impl Context {
    /// Creates a new empty context with a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context with a specific correlation id.
    #[must_use]
    pub fn with_correlation_id(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            ..Self::default()
        }
    }

    pub(crate) fn from_snapshot_parts(
        correlation_id: Uuid,
        created_at: DateTime<Utc>,
        entries: Vec<SnapshotEntry>,
    ) -> Self {
        let mut map = EntryMap::default();
        for entry in entries {
            map.insert(entry.key, entry.value, true);
        }
        Self {
            correlation_id,
            created_at,
            tx_id: RwLock::new(None),
            entries: RwLock::new(map),
            trace: TraceLog::new(),
        }
    }

    /// Returns the correlation id used for cross-system log stitching.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Returns the wall-clock instant this context was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the transaction id, if one has been assigned.
    #[must_use]
    pub fn id(&self) -> Option<TxId> {
        *self.tx_id.read()
    }

    pub(crate) fn set_id(&self, id: TxId) {
        *self.tx_id.write() = Some(id);
    }

    /// Stores a volatile entry.
    ///
    /// Volatile entries exist only in memory and are dropped whenever the
    /// context is serialized for a snapshot or recovered after a restart.
    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        self.entries.write().insert(key.into(), value, false);
    }

    /// Stores a persistent entry, included in every durable snapshot.
    pub fn put_persistent(&self, key: impl Into<String>, value: serde_json::Value) {
        self.entries.write().insert(key.into(), value, true);
    }

    /// Gets a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.read().map.get(key).map(|e| e.value.clone())
    }

    /// Removes an entry, returning its value.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.write().remove(key)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().map.contains_key(key)
    }

    /// Returns true if the entry exists and is flagged persistent.
    #[must_use]
    pub fn is_persistent(&self, key: &str) -> bool {
        self.entries.read().map.get(key).is_some_and(|e| e.persistent)
    }

    /// Returns all keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().order.clone()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    /// Returns true if the context has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().map.is_empty()
    }

    /// Captures the persistent subset as a snapshot.
    ///
    /// Volatile entries, the transaction id, and the checkpoint trace are
    /// all excluded; the snapshot must be reconstructible from the recovery
    /// store alone.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        let entries = self
            .entries
            .read()
            .ordered()
            .filter(|(_, e)| e.persistent)
            .map(|(k, e)| SnapshotEntry {
                key: k.clone(),
                value: e.value.clone(),
            })
            .collect();

        ContextSnapshot {
            correlation_id: self.correlation_id,
            created_at: self.created_at,
            entries,
        }
    }

    /// Records a checkpoint in the observability trace.
    ///
    /// The trace never affects control flow and is not part of any durable
    /// snapshot.
    pub fn checkpoint(&self, label: impl Into<String>) {
        self.trace.checkpoint(label);
    }

    /// Returns a copy of the recorded checkpoints.
    #[must_use]
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.trace.checkpoints()
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Self {
            correlation_id: self.correlation_id,
            created_at: self.created_at,
            tx_id: RwLock::new(*self.tx_id.read()),
            entries: RwLock::new(self.entries.read().clone()),
            trace: self.trace.clone(),
        }
    }
}
