//! Transaction id assignment and head/tail bookkeeping.

use crate::context::TxId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// The process-wide id counter plus the in-flight id set.
///
/// Ids start at 1 and are never reused. `head` is the highest id assigned
/// so far; `tail` is the lowest id still unresolved, which bounds how far
/// back a recovery scan can matter.
#[derive(Debug)]
pub(crate) struct TxSequence {
    next: AtomicU64,
    in_flight: Mutex<BTreeSet<TxId>>,
}

impl Default for TxSequence {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
            in_flight: Mutex::new(BTreeSet::new()),
        }
    }
}

impl TxSequence {
    /// Assigns the next id.
    pub fn next_id(&self) -> TxId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Marks an id as in flight, advancing the counter past it if needed.
    ///
    /// Recovered ids from a previous process life re-enter through here, so
    /// freshly assigned ids can never collide with them.
    pub fn admit(&self, id: TxId) {
        self.next.fetch_max(id + 1, Ordering::SeqCst);
        self.in_flight.lock().insert(id);
    }

    /// Marks an id as fully resolved.
    pub fn resolve(&self, id: TxId) {
        self.in_flight.lock().remove(&id);
    }

    /// Returns the highest id assigned so far (0 before any assignment).
    pub fn head(&self) -> TxId {
        self.next.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Returns the lowest in-flight id, or the head when nothing is in
    /// flight.
    pub fn tail(&self) -> TxId {
        self.in_flight
            .lock()
            .first()
            .copied()
            .unwrap_or_else(|| self.head())
    }

    /// Returns the number of in-flight transactions.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}
