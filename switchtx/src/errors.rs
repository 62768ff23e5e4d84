//! Error types for the switchtx engine.

use thiserror::Error;

use crate::context::TxId;

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A recovery-store operation failed after exhausting its retries.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A chain/group configuration error.
    #[error("{0}")]
    Config(#[from] ChainConfigError),

    /// Snapshot serialization or deserialization failed.
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A participant selected a group that is not configured.
    #[error("Unknown group '{name}' selected by participant '{participant}'")]
    UnknownGroup {
        /// The group name that was requested.
        name: String,
        /// The participant that requested it.
        participant: String,
    },

    /// The admission queue has been closed.
    #[error("Admission queue is closed")]
    QueueClosed,
}

/// Errors reported by a [`RecoveryStore`](crate::store::RecoveryStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("Recovery store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored snapshot could not be interpreted.
    #[error("Corrupt snapshot for transaction {id}: {reason}")]
    Corrupt {
        /// The transaction id the snapshot was stored under.
        id: TxId,
        /// What was wrong with it.
        reason: String,
    },
}

/// Errors raised while building a [`GroupTable`](crate::registry::GroupTable).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainConfigError {
    /// The main chain has no participants.
    #[error("The main participant chain is empty")]
    EmptyChain,

    /// A named group has no participants.
    #[error("Group '{0}' is empty")]
    EmptyGroup(String),

    /// A group name was registered twice.
    #[error("Group '{0}' is defined more than once")]
    DuplicateGroup(String),

    /// A group used a reserved name.
    #[error("Group name '{0}' is reserved")]
    ReservedName(String),
}
