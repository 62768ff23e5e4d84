//! Work admission: the boundary the engine takes contexts from.
//!
//! The engine only depends on [`WorkSource`]. The bundled
//! [`WorkQueue`]/[`QueueSource`] pair is a bounded in-process channel used
//! for tests, benches, and single-process deployments; a tuple-space or
//! network-fed collaborator can stand in behind the same trait.
//!
//! Re-admission of a paused transaction uses the same interface as new
//! work: the engine tells the two apart solely by whether the context's id
//! is present in the paused-transaction table.

use crate::context::Context;
use crate::errors::EngineError;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Trait for the engine's intake side.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Takes the next unit of work, waiting until one is available.
    ///
    /// Returns `None` when the source is closed and drained; workers exit.
    async fn take(&self) -> Option<Context>;
}

/// Producer handle for submitting work into the bundled queue.
///
/// Cheap to clone; used both by originators of new work and by collaborators
/// re-admitting a paused transaction.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<Context>,
}

impl WorkQueue {
    /// Submits a context, waiting for queue capacity.
    pub async fn submit(&self, ctx: Context) -> Result<(), EngineError> {
        self.tx.send(ctx).await.map_err(|_| EngineError::QueueClosed)
    }

    /// Submits a context without waiting.
    ///
    /// Fails when the queue is full or closed.
    pub fn try_submit(&self, ctx: Context) -> Result<(), EngineError> {
        self.tx.try_send(ctx).map_err(|_| EngineError::QueueClosed)
    }
}

/// Consumer side of the bundled queue.
///
/// Shared by all workers; `take` is safe to call concurrently.
#[derive(Debug)]
pub struct QueueSource {
    rx: Mutex<mpsc::Receiver<Context>>,
}

#[async_trait]
impl WorkSource for QueueSource {
    async fn take(&self) -> Option<Context> {
        self.rx.lock().await.recv().await
    }
}

/// Creates a bounded admission queue.
#[must_use]
pub fn work_queue(capacity: usize) -> (WorkQueue, QueueSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (WorkQueue { tx }, QueueSource { rx: Mutex::new(rx) })
}
