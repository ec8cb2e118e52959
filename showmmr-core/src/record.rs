use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier assigned to a match by the remote service.
pub type MatchId = u64;

/// MMR-relevant facts of a single remote match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub start_time: u32,
    pub previous_rank: u32,
    pub rank_change: i32,
    #[serde(default = "MatchRecord::default_solo_rank")]
    pub solo_rank: bool,
    #[serde(default)]
    pub hero_id: i32,
}

impl MatchRecord {
    /// Builds a solo-queue record with an unknown hero.
    pub fn new(match_id: MatchId, start_time: u32, previous_rank: u32, rank_change: i32) -> Self {
        Self {
            match_id,
            start_time,
            previous_rank,
            rank_change,
            solo_rank: Self::default_solo_rank(),
            hero_id: 0,
        }
    }

    #[must_use]
    pub fn with_solo_rank(mut self, solo_rank: bool) -> Self {
        self.solo_rank = solo_rank;
        self
    }

    #[must_use]
    pub fn with_hero(mut self, hero_id: i32) -> Self {
        self.hero_id = hero_id;
        self
    }

    fn default_solo_rank() -> bool {
        true
    }

    /// Rating after this match was applied.
    pub fn rank_after(&self) -> i64 {
        i64::from(self.previous_rank) + i64::from(self.rank_change)
    }

    /// Rating plotted for this match under the given schema.
    pub fn displayed_rank(&self, schema: SchemaVariant) -> i64 {
        match schema {
            SchemaVariant::Minimal => i64::from(self.previous_rank),
            SchemaVariant::Rich => self.rank_after(),
        }
    }
}

/// Column layout of the persisted ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVariant {
    /// `Date, Unix time, MatchID, Start MMR, Rank Change`
    Minimal,
    /// Adds `Solo Queue` and `HeroID`, and enables the party-queue filter.
    #[default]
    Rich,
}

const MINIMAL_HEADER: &[&str] = &["Date", "Unix time", "MatchID", "Start MMR", "Rank Change"];
const RICH_HEADER: &[&str] = &[
    "Date",
    "Unix time",
    "MatchID",
    "Solo Queue",
    "HeroID",
    "Start MMR",
    "Rank Change",
];

impl SchemaVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaVariant::Minimal => "minimal",
            SchemaVariant::Rich => "rich",
        }
    }

    pub fn header(self) -> &'static [&'static str] {
        match self {
            SchemaVariant::Minimal => MINIMAL_HEADER,
            SchemaVariant::Rich => RICH_HEADER,
        }
    }

    /// Identify the schema of an existing ledger from its header row.
    pub fn detect<'a>(header: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let columns: Vec<&str> = header.into_iter().map(str::trim).collect();
        [SchemaVariant::Minimal, SchemaVariant::Rich]
            .into_iter()
            .find(|variant| variant.header() == columns.as_slice())
    }

    /// Whether records carry queue and hero information.
    pub fn is_rich(self) -> bool {
        matches!(self, SchemaVariant::Rich)
    }
}

impl fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown schema variant: {0}")]
pub struct SchemaError(String);

impl FromStr for SchemaVariant {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" | "v1" => Ok(SchemaVariant::Minimal),
            "rich" | "v2" => Ok(SchemaVariant::Rich),
            other => Err(SchemaError(other.to_string())),
        }
    }
}
