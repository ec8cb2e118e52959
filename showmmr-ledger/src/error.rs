use std::path::PathBuf;

use thiserror::Error;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("unrecognized header in {}: {header}", path.display())]
    UnknownHeader { path: PathBuf, header: String },
    #[error("malformed row in {} at line {line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

impl LedgerError {
    /// Whether the operator has to repair or remove the ledger file by hand.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            LedgerError::UnknownHeader { .. } | LedgerError::Malformed { .. }
        )
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<csv::Error> for LedgerError {
    fn from(value: csv::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
