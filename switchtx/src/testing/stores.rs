//! Fault-injecting recovery stores for tests.

use crate::context::TxId;
use crate::errors::StoreError;
use crate::store::{MemoryRecoveryStore, RecoveryStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// A recovery store whose writes can be made to fail on demand.
///
/// Reads always delegate to the wrapped in-memory store, so tests can
/// assert what survived a failing write path.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryRecoveryStore,
    fail_puts: AtomicBool,
    fail_removes: AtomicBool,
}

impl FailingStore {
    /// Creates a healthy store; flip failures on as needed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `put` fail until turned off.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Makes every `remove` fail until turned off.
    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// The wrapped store, for assertions.
    #[must_use]
    pub fn inner(&self) -> &MemoryRecoveryStore {
        &self.inner
    }

    fn injected() -> StoreError {
        StoreError::Io(std::io::Error::other("injected store failure"))
    }
}

#[async_trait]
impl RecoveryStore for FailingStore {
    async fn put(&self, id: TxId, snapshot: &[u8]) -> Result<(), StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.put(id, snapshot).await
    }

    async fn get(&self, id: TxId) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(id).await
    }

    async fn remove(&self, id: TxId) -> Result<(), StoreError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.remove(id).await
    }

    async fn list_all(&self) -> Result<Vec<(TxId, Vec<u8>)>, StoreError> {
        self.inner.list_all().await
    }
}
