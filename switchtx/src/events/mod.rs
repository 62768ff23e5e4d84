//! Engine observability events.
//!
//! The engine reports transaction lifecycle events and flushed checkpoint
//! traces through a [`TraceSink`]. Sink failures must never affect control
//! flow: the engine only ever uses the non-propagating emit path.

mod sink;

pub use sink::{CollectingTraceSink, LoggingTraceSink, NoOpTraceSink, TraceSink};
