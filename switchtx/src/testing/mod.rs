//! Test utilities: scripted participants, call recording, and fault
//! injection.
//!
//! Used by the crate's own tests and exported so downstream users can test
//! their chains the same way.

mod participants;
mod stores;

pub use participants::{CallRecorder, ScriptedParticipant};
pub use stores::FailingStore;

/// Installs a test-friendly tracing subscriber, once per process.
///
/// Honors `RUST_LOG`; repeated calls are no-ops so tests can call it
/// unconditionally.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
