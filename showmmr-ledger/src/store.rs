use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use showmmr_core::{MatchId, MatchRecord};
use tracing::{debug, warn};

use crate::{LedgerRepository, LedgerResult};

/// Result of offering a record to the [`MergeStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The record was new and now sits at its ordered position.
    Inserted,
    /// A record with the same match id is already in the dataset.
    Duplicate,
    /// The record is the newest match persisted by a previous session.
    Boundary,
}

/// Most recent first, match id breaking ties.
type OrderKey = (Reverse<u32>, Reverse<MatchId>);

fn order_key(record: &MatchRecord) -> OrderKey {
    (Reverse(record.start_time), Reverse(record.match_id))
}

/// In-memory dataset ordered by start time descending and unique by match id.
///
/// The watermark is captured once, when the dataset is built from persisted
/// records, and never moves afterwards.
#[derive(Clone, Debug, Default)]
pub struct MergeStore {
    ordered: BTreeMap<OrderKey, MatchRecord>,
    index: HashMap<MatchId, OrderKey>,
    watermark: Option<MatchId>,
    inserted: usize,
}

impl MergeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted records.
    pub fn from_records(records: impl IntoIterator<Item = MatchRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            if store.index.contains_key(&record.match_id) {
                warn!(
                    match_id = record.match_id,
                    "dropping duplicate match from ledger"
                );
                continue;
            }
            store.insert(record);
        }
        store.watermark = store.newest().map(|record| record.match_id);
        store
    }

    /// Load the dataset persisted in `ledger`.
    pub fn load(ledger: &dyn LedgerRepository) -> LedgerResult<Self> {
        let store = Self::from_records(ledger.load()?);
        debug!(
            records = store.len(),
            watermark = ?store.watermark,
            "merge store loaded"
        );
        Ok(store)
    }

    /// Replace the ledger contents with the full dataset.
    pub fn save(&self, ledger: &dyn LedgerRepository) -> LedgerResult<()> {
        ledger.replace(&self.to_vec())
    }

    /// Offer a fetched record to the dataset.
    pub fn merge(&mut self, record: MatchRecord) -> MergeOutcome {
        if self.watermark == Some(record.match_id) {
            return MergeOutcome::Boundary;
        }
        if self.index.contains_key(&record.match_id) {
            debug!(match_id = record.match_id, "ignoring duplicate match");
            return MergeOutcome::Duplicate;
        }
        self.insert(record);
        self.inserted += 1;
        MergeOutcome::Inserted
    }

    fn insert(&mut self, record: MatchRecord) {
        let key = order_key(&record);
        self.index.insert(record.match_id, key);
        self.ordered.insert(key, record);
    }

    /// Newest match id persisted before this session started.
    pub fn watermark(&self) -> Option<MatchId> {
        self.watermark
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains(&self, match_id: MatchId) -> bool {
        self.index.contains_key(&match_id)
    }

    /// Number of records added by `merge` since the store was built.
    pub fn inserted_this_session(&self) -> usize {
        self.inserted
    }

    /// Records from most to least recent.
    pub fn records(&self) -> impl DoubleEndedIterator<Item = &MatchRecord> + '_ {
        self.ordered.values()
    }

    pub fn to_vec(&self) -> Vec<MatchRecord> {
        self.records().copied().collect()
    }

    pub fn newest(&self) -> Option<&MatchRecord> {
        self.ordered.values().next()
    }

    pub fn oldest(&self) -> Option<&MatchRecord> {
        self.ordered.values().next_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;

    fn rec(match_id: MatchId, start_time: u32) -> MatchRecord {
        MatchRecord::new(match_id, start_time, 3_000, 25)
    }

    fn ids(store: &MergeStore) -> Vec<MatchId> {
        store.records().map(|record| record.match_id).collect()
    }

    #[test]
    fn watermark_is_newest_persisted_match() {
        let store = MergeStore::from_records(vec![rec(100, 1_000), rec(90, 900)]);
        assert_eq!(store.watermark(), Some(100));
        assert_eq!(MergeStore::new().watermark(), None);
    }

    #[test]
    fn merge_keeps_start_time_descending() {
        let mut store = MergeStore::from_records(vec![rec(100, 1_000), rec(90, 900)]);
        assert_eq!(store.merge(rec(95, 950)), MergeOutcome::Inserted);
        assert_eq!(store.merge(rec(120, 1_200)), MergeOutcome::Inserted);
        assert_eq!(store.merge(rec(80, 800)), MergeOutcome::Inserted);
        assert_eq!(ids(&store), vec![120, 100, 95, 90, 80]);
        let records = store.to_vec();
        assert!(records
            .windows(2)
            .all(|pair| pair[0].start_time >= pair[1].start_time));
        assert_eq!(store.inserted_this_session(), 3);
    }

    #[test]
    fn boundary_record_is_not_inserted() {
        let mut store = MergeStore::from_records(vec![rec(100, 1_000)]);
        assert_eq!(store.merge(rec(100, 1_000)), MergeOutcome::Boundary);
        assert_eq!(store.len(), 1);
        assert_eq!(store.inserted_this_session(), 0);
    }

    #[test]
    fn duplicate_match_ids_are_rejected() {
        let mut store = MergeStore::from_records(vec![rec(100, 1_000), rec(90, 900)]);
        assert_eq!(store.merge(rec(110, 1_100)), MergeOutcome::Inserted);
        assert_eq!(store.merge(rec(110, 1_100)), MergeOutcome::Duplicate);
        assert_eq!(store.merge(rec(90, 905)), MergeOutcome::Duplicate);
        assert_eq!(ids(&store), vec![110, 100, 90]);
    }

    #[test]
    fn equal_start_times_order_by_match_id() {
        let mut store = MergeStore::new();
        store.merge(rec(5, 500));
        store.merge(rec(7, 500));
        store.merge(rec(6, 500));
        assert_eq!(ids(&store), vec![7, 6, 5]);
    }

    #[test]
    fn unsorted_ledger_is_normalized_on_load() {
        let ledger = MemoryLedger::new(vec![rec(90, 900), rec(100, 1_000), rec(90, 900)]);
        let store = MergeStore::load(&ledger).unwrap();
        assert_eq!(ids(&store), vec![100, 90]);
        assert_eq!(store.watermark(), Some(100));
    }

    #[test]
    fn save_replaces_ledger_contents() {
        let ledger = MemoryLedger::new(vec![rec(100, 1_000)]);
        let mut store = MergeStore::load(&ledger).unwrap();
        store.merge(rec(101, 1_010));
        store.save(&ledger).unwrap();
        assert_eq!(
            ledger
                .snapshot()
                .iter()
                .map(|record| record.match_id)
                .collect::<Vec<_>>(),
            vec![101, 100]
        );
        assert_eq!(ledger.writes(), 1);
        assert_eq!(store.oldest().map(|record| record.match_id), Some(100));
    }
}
