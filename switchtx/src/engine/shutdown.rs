//! Cooperative shutdown signal for the worker pool.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A token workers watch for engine shutdown.
///
/// Triggering is idempotent - only the first reason is kept. Workers finish
/// the transaction in hand before observing the token, so shutdown never
/// interrupts a chain walk.
#[derive(Debug, Default)]
pub struct ShutdownToken {
    triggered: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

impl ShutdownToken {
    /// Creates a new untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown with a reason.
    ///
    /// This is idempotent - only the first reason is kept.
    pub fn trigger(&self, reason: impl Into<String>) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
            self.notify.notify_waiters();
        }
    }

    /// Returns whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Returns the shutdown reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }

    /// Waits until shutdown is requested.
    pub async fn wait(&self) {
        loop {
            if self.is_triggered() {
                return;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}
