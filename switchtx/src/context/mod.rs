//! The unit-of-work state container carried through the participant chain.
//!
//! A [`Context`] is created once per transaction and owned by exactly one
//! worker at a time. Participants receive a shared reference and mutate it
//! through interior mutability; only the persistent subset of its entries is
//! ever written to the recovery store.

mod entries;
mod snapshot;
mod trace;


pub use entries::Context;
pub use snapshot::{ContextSnapshot, SnapshotEntry};
pub use trace::{Checkpoint, TraceLog};

/// A process-wide, monotonically increasing transaction id.
///
/// Assigned at first admission into the pipeline; resume, retry, and
/// recovery all reuse the original id. Ids are never reused across
/// transactions.
pub type TxId = u64;
