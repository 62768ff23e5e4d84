//! In-memory registry of suspended transactions.

use crate::context::TxId;
use crate::registry::ParticipantEntry;
use dashmap::DashMap;

/// Execution state saved when a transaction pauses.
///
/// Holds everything needed to continue from the next participant rather
/// than the start: the active group, the index to resume at, whether the
/// transaction is already committed to the abort path, and the
/// participants that have joined so far.
#[derive(Debug, Clone)]
pub(crate) struct PausedRecord {
    pub group: String,
    pub index: usize,
    pub aborting: bool,
    pub joined: Vec<ParticipantEntry>,
}

/// The paused-transaction table.
///
/// A paused transaction is owned by no worker; the record lives here until
/// an external actor re-admits the context, at which point any worker may
/// pick it up. The engine never expires entries on its own - resumption is
/// entirely the collaborator's responsibility.
#[derive(Debug, Default)]
pub(crate) struct PausedTable {
    records: DashMap<TxId, PausedRecord>,
}

impl PausedTable {
    pub fn insert(&self, id: TxId, record: PausedRecord) {
        self.records.insert(id, record);
    }

    /// Removes and returns the record, claiming the resumption.
    pub fn take(&self, id: TxId) -> Option<PausedRecord> {
        self.records.remove(&id).map(|(_, record)| record)
    }

    pub fn contains(&self, id: TxId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PausedRecord {
        PausedRecord {
            group: "main".to_string(),
            index: 2,
            aborting: false,
            joined: Vec::new(),
        }
    }

    #[test]
    fn test_insert_take() {
        let table = PausedTable::default();
        table.insert(5, record());

        assert!(table.contains(5));
        assert_eq!(table.len(), 1);

        let taken = table.take(5).unwrap();
        assert_eq!(taken.index, 2);
        assert!(!table.contains(5));
    }

    #[test]
    fn test_take_is_exclusive() {
        let table = PausedTable::default();
        table.insert(5, record());

        assert!(table.take(5).is_some());
        assert!(table.take(5).is_none());
    }
}
