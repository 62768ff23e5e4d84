//! The prepare-result protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome a participant votes during the prepare pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    /// The participant is willing to commit.
    Prepared,
    /// The participant requires the transaction to abort.
    Aborted,
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepared => write!(f, "prepared"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// The result of a participant's prepare (or prepare-for-abort) call.
///
/// A vote plus a small set of modifier flags:
///
/// - `retry` — re-invoke this participant's prepare instead of advancing;
///   examined before every other flag, which are ignored until a final
///   (non-retry) result is returned
/// - `pause` — suspend the whole transaction after this participant
/// - `no_join` — opt out of the later commit/abort call
/// - `readonly` — the context was not mutated, so the engine can skip the
///   snapshot refresh for this step
///
/// An `Aborted` vote never joins the commit/abort pass, regardless of
/// `no_join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareResult {
    vote: Vote,
    no_join: bool,
    readonly: bool,
    pause: bool,
    retry: bool,
}

impl PrepareResult {
    /// A plain `Prepared` vote that joins the commit/abort pass.
    #[must_use]
    pub fn prepared() -> Self {
        Self {
            vote: Vote::Prepared,
            no_join: false,
            readonly: false,
            pause: false,
            retry: false,
        }
    }

    /// An `Aborted` vote.
    #[must_use]
    pub fn aborted() -> Self {
        Self {
            vote: Vote::Aborted,
            no_join: false,
            readonly: false,
            pause: false,
            retry: false,
        }
    }

    /// Asks the engine to re-invoke this participant's prepare.
    #[must_use]
    pub fn retry() -> Self {
        Self {
            retry: true,
            ..Self::prepared()
        }
    }

    /// Marks this participant as opting out of commit/abort.
    #[must_use]
    pub fn no_join(mut self) -> Self {
        self.no_join = true;
        self
    }

    /// Asserts the context was not mutated by this call.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Suspends the whole transaction after this participant.
    #[must_use]
    pub fn pause(mut self) -> Self {
        self.pause = true;
        self
    }

    /// Returns the vote.
    #[must_use]
    pub fn vote(&self) -> Vote {
        self.vote
    }

    /// Returns true for a `Prepared` vote.
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.vote == Vote::Prepared
    }

    /// Returns true for an `Aborted` vote.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.vote == Vote::Aborted
    }

    /// Returns true if this participant takes part in the commit/abort pass.
    #[must_use]
    pub fn joins(&self) -> bool {
        self.is_prepared() && !self.no_join
    }

    /// Returns true if the snapshot refresh can be skipped.
    #[must_use]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Returns true if the transaction should suspend after this step.
    #[must_use]
    pub fn wants_pause(&self) -> bool {
        self.pause
    }

    /// Returns true if this participant's prepare should be re-invoked.
    #[must_use]
    pub fn wants_retry(&self) -> bool {
        self.retry
    }
}

impl fmt::Display for PrepareResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.vote)?;
        if self.retry {
            write!(f, "|retry")?;
        }
        if self.pause {
            write!(f, "|pause")?;
        }
        if self.no_join {
            write!(f, "|no_join")?;
        }
        if self.readonly {
            write!(f, "|readonly")?;
        }
        Ok(())
    }
}
