//! The participant contract.
//!
//! Participants are the configured steps of a transaction chain. Every
//! participant implements the two-phase core (`prepare`, then exactly one of
//! `commit`/`abort` if it joined); the optional capabilities — abort-path
//! preparation, group selection, and recovery — are declared through a
//! [`Capabilities`] mask resolved once at registration time.

mod result;

pub use result::{PrepareResult, Vote};

use crate::context::{Context, TxId};
use async_trait::async_trait;
use std::fmt::Debug;

/// Optional participant capabilities, declared once per participant.
///
/// The engine checks the registered mask before each optional call, so a
/// participant that does not declare a capability never receives the
/// corresponding call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No optional capabilities.
    pub const NONE: Self = Self(0);
    /// Receives `prepare_for_abort` once the transaction is known to abort.
    pub const ABORT_PREPARE: Self = Self(1);
    /// Consulted for a group switch after a successful prepare.
    pub const GROUP_SELECT: Self = Self(1 << 1);
    /// Receives `recover` when a snapshot is replayed after a restart.
    pub const RECOVER: Self = Self(1 << 2);

    /// Combines two capability sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if every capability in `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no capability is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Trait for transaction participants.
///
/// `prepare` must be idempotent for a given transaction id: after a crash
/// the engine cannot know whether a prepare already ran, so recovery replays
/// the chain from the start. `commit` and `abort` must likewise tolerate
/// repeated invocation for the same id.
#[async_trait]
pub trait Participant: Send + Sync + Debug {
    /// Returns the name of the participant.
    fn name(&self) -> &str;

    /// Declares the optional capabilities this participant supports.
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// First-phase call, invoked in chain order.
    async fn prepare(&self, id: TxId, ctx: &Context) -> PrepareResult;

    /// Finalizes a transaction this participant joined.
    async fn commit(&self, id: TxId, ctx: &Context);

    /// Rolls back a transaction this participant joined.
    async fn abort(&self, id: TxId, ctx: &Context);

    /// Abort-path variant of prepare.
    ///
    /// Called instead of `prepare` when an earlier participant has already
    /// aborted the transaction, and only if [`Capabilities::ABORT_PREPARE`]
    /// is declared. The vote is moot at this point; `no_join` and
    /// `readonly` are still honored. The default joins the abort pass
    /// without touching the snapshot.
    async fn prepare_for_abort(&self, _id: TxId, _ctx: &Context) -> PrepareResult {
        PrepareResult::prepared().readonly()
    }

    /// Names the group to splice in place of the remaining chain.
    ///
    /// Consulted after a successful (non-retry) prepare, and only if
    /// [`Capabilities::GROUP_SELECT`] is declared. `None` or an empty name
    /// leaves the chain unchanged.
    async fn select_group(&self, _id: TxId, _ctx: &Context) -> Option<String> {
        None
    }

    /// Rebuilds transient state when a snapshot is replayed after restart.
    ///
    /// Called before any prepare/commit/abort on the replayed transaction,
    /// and only if [`Capabilities::RECOVER`] is declared.
    async fn recover(&self, _id: TxId, _ctx: &Context) {}
}

/// A function-based participant with no commit/abort side effects.
pub struct FnParticipant<F>
where
    F: Fn(TxId, &Context) -> PrepareResult + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnParticipant<F>
where
    F: Fn(TxId, &Context) -> PrepareResult + Send + Sync,
{
    /// Creates a new function-based participant.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnParticipant<F>
where
    F: Fn(TxId, &Context) -> PrepareResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnParticipant")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Participant for FnParticipant<F>
where
    F: Fn(TxId, &Context) -> PrepareResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(&self, id: TxId, ctx: &Context) -> PrepareResult {
        (self.func)(id, ctx)
    }

    async fn commit(&self, _id: TxId, _ctx: &Context) {}

    async fn abort(&self, _id: TxId, _ctx: &Context) {}
}
