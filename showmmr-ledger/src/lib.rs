//! Ledger storage and the ordered, de-duplicated match dataset.

mod csv_ledger;
mod error;
#[cfg(test)]
mod memory;
mod repository;
mod store;

pub use csv_ledger::CsvLedger;
pub use error::{LedgerError, LedgerResult};
pub use repository::LedgerRepository;
pub use store::{MergeOutcome, MergeStore};
