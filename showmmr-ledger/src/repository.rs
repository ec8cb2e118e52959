use showmmr_core::MatchRecord;

use crate::LedgerResult;

/// Abstraction over durable match ledgers.
pub trait LedgerRepository: Send + Sync {
    /// Read every persisted record in stored order. An absent ledger yields no records.
    fn load(&self) -> LedgerResult<Vec<MatchRecord>>;

    /// Replace the persisted contents with `records` in one step.
    fn replace(&self, records: &[MatchRecord]) -> LedgerResult<()>;
}
