//! The recovery store: a keyed durable byte store for in-flight snapshots.
//!
//! The engine writes the persistent subset of every in-flight context here,
//! keyed by transaction id, and removes the entry when the transaction
//! resolves. Whatever is left at cold start is exactly the set of
//! transactions that were admitted but never resolved.

mod file;

pub use file::FileRecoveryStore;

use crate::context::TxId;
use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Trait for durable snapshot stores.
///
/// Per-id access is independent; implementations must support concurrent
/// calls from many workers.
#[async_trait]
pub trait RecoveryStore: Send + Sync + Debug {
    /// Writes (or replaces) the snapshot for a transaction id.
    async fn put(&self, id: TxId, snapshot: &[u8]) -> Result<(), StoreError>;

    /// Reads the snapshot for a transaction id.
    async fn get(&self, id: TxId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Removes the snapshot for a resolved transaction.
    ///
    /// Removing an absent id is not an error.
    async fn remove(&self, id: TxId) -> Result<(), StoreError>;

    /// Returns every stored snapshot, ordered by id.
    async fn list_all(&self) -> Result<Vec<(TxId, Vec<u8>)>, StoreError>;
}

/// An in-memory recovery store.
///
/// Provides no durability across a process restart; intended for tests,
/// benches, and deployments where an external collaborator owns durability.
/// Tracks write counts as a cheap metric.
#[derive(Debug, Default)]
pub struct MemoryRecoveryStore {
    snapshots: DashMap<TxId, Vec<u8>>,
    puts: AtomicU64,
    removes: AtomicU64,
}

impl MemoryRecoveryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns true if no snapshots are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Returns true if a snapshot exists for the id.
    #[must_use]
    pub fn contains(&self, id: TxId) -> bool {
        self.snapshots.contains_key(&id)
    }

    /// Returns the total number of `put` calls served.
    #[must_use]
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Returns the total number of `remove` calls served.
    #[must_use]
    pub fn remove_count(&self) -> u64 {
        self.removes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RecoveryStore for MemoryRecoveryStore {
    async fn put(&self, id: TxId, snapshot: &[u8]) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.snapshots.insert(id, snapshot.to_vec());
        Ok(())
    }

    async fn get(&self, id: TxId) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.snapshots.get(&id).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, id: TxId) -> Result<(), StoreError> {
        self.removes.fetch_add(1, Ordering::Relaxed);
        self.snapshots.remove(&id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<(TxId, Vec<u8>)>, StoreError> {
        let mut all: Vec<(TxId, Vec<u8>)> = self
            .snapshots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        Ok(all)
    }
}
