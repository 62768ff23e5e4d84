//! Configured participant chains and named alternate groups.
//!
//! A [`GroupTable`] is built once at configuration time and immutable
//! afterwards. It holds the main chain plus zero or more named groups that a
//! running transaction can be redirected into by a group-selecting
//! participant; switching groups replaces the not-yet-executed suffix of the
//! active chain with the named group's list, starting at its first element.

use crate::errors::ChainConfigError;
use crate::participant::{Capabilities, Participant};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The name of the implicit main chain.
pub const MAIN_GROUP: &str = "main";

/// A registered participant with its capabilities resolved.
///
/// The capability mask is captured once at build time; the engine consults
/// the mask, not the trait object, before each optional call.
#[derive(Clone)]
pub struct ParticipantEntry {
    participant: Arc<dyn Participant>,
    capabilities: Capabilities,
}

impl ParticipantEntry {
    fn new(participant: Arc<dyn Participant>) -> Self {
        let capabilities = participant.capabilities();
        Self {
            participant,
            capabilities,
        }
    }

    /// Returns the participant's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.participant.name()
    }

    /// Returns the participant.
    #[must_use]
    pub fn participant(&self) -> &Arc<dyn Participant> {
        &self.participant
    }

    /// Returns the resolved capability mask.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl fmt::Debug for ParticipantEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticipantEntry")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// An immutable chain of registered participants.
pub type Chain = Arc<Vec<ParticipantEntry>>;

/// The configured chains: the main chain plus named alternate groups.
#[derive(Debug, Clone)]
pub struct GroupTable {
    main: Chain,
    groups: HashMap<String, Chain>,
}

impl GroupTable {
    /// Returns the main chain.
    #[must_use]
    pub fn main_chain(&self) -> Chain {
        Arc::clone(&self.main)
    }

    /// Returns the chain for a group name.
    ///
    /// [`MAIN_GROUP`] resolves to the main chain.
    #[must_use]
    pub fn chain(&self, group: &str) -> Option<Chain> {
        if group == MAIN_GROUP {
            Some(Arc::clone(&self.main))
        } else {
            self.groups.get(group).map(Arc::clone)
        }
    }

    /// Returns the configured group names (not including the main chain).
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// Returns the number of participants in the main chain.
    #[must_use]
    pub fn main_len(&self) -> usize {
        self.main.len()
    }
}

/// Builder for a [`GroupTable`].
#[derive(Debug, Default)]
pub struct GroupTableBuilder {
    main: Vec<ParticipantEntry>,
    groups: Vec<(String, Vec<ParticipantEntry>)>,
}

impl GroupTableBuilder {
    /// Creates a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a participant to the main chain.
    #[must_use]
    pub fn participant(mut self, participant: Arc<dyn Participant>) -> Self {
        self.main.push(ParticipantEntry::new(participant));
        self
    }

    /// Registers a named alternate group.
    #[must_use]
    pub fn group(
        mut self,
        name: impl Into<String>,
        participants: Vec<Arc<dyn Participant>>,
    ) -> Self {
        let entries = participants.into_iter().map(ParticipantEntry::new).collect();
        self.groups.push((name.into(), entries));
        self
    }

    /// Validates the configuration and builds the immutable table.
    pub fn build(self) -> Result<GroupTable, ChainConfigError> {
        if self.main.is_empty() {
            return Err(ChainConfigError::EmptyChain);
        }

        let mut groups = HashMap::new();
        for (name, entries) in self.groups {
            if name == MAIN_GROUP || name.is_empty() {
                return Err(ChainConfigError::ReservedName(name));
            }
            if entries.is_empty() {
                return Err(ChainConfigError::EmptyGroup(name));
            }
            if groups.insert(name.clone(), Arc::new(entries)).is_some() {
                return Err(ChainConfigError::DuplicateGroup(name));
            }
        }

        Ok(GroupTable {
            main: Arc::new(self.main),
            groups,
        })
    }
}
