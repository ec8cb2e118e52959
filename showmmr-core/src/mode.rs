use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a sync session does once it reaches previously persisted history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Stop at the newest persisted match.
    #[default]
    Incremental,
    /// Jump past the persisted range and keep paging into older history.
    Backfill,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Incremental => "incremental",
            SyncMode::Backfill => "backfill",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "incremental" => Ok(SyncMode::Incremental),
            "backfill" => Ok(SyncMode::Backfill),
            other => Err(format!("unknown sync mode: {other}")),
        }
    }
}
