use parking_lot::Mutex;
use showmmr_core::MatchRecord;

use crate::{LedgerRepository, LedgerResult};

/// Volatile ledger kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<MatchRecord>>,
    writes: Mutex<usize>,
}

impl MemoryLedger {
    pub fn new(records: Vec<MatchRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            writes: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Vec<MatchRecord> {
        self.records.lock().clone()
    }

    /// Number of completed `replace` calls.
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }
}

impl LedgerRepository for MemoryLedger {
    fn load(&self) -> LedgerResult<Vec<MatchRecord>> {
        Ok(self.snapshot())
    }

    fn replace(&self, records: &[MatchRecord]) -> LedgerResult<()> {
        *self.records.lock() = records.to_vec();
        *self.writes.lock() += 1;
        Ok(())
    }
}
