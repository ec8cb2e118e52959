//! Output of [`crate::AnalyticsEngine::compute`].

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use showmmr_core::{hero_name, MatchId, SchemaVariant};

/// One chart point: when the match started and the rating shown for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    /// Match the point was derived from.
    pub match_id: MatchId,
    /// Start time in the caller's civil time.
    pub at: DateTime<FixedOffset>,
    /// Rating plotted on the y axis.
    pub rank: i64,
}

/// Matches with unusually large swings, attributed to the double-down mechanic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DoubleDownStats {
    /// Number of qualifying matches.
    pub count: u32,
    /// Qualifying matches with a positive rating change.
    pub wins: u32,
    /// `100 * wins / count`, truncated; zero when nothing qualified.
    pub accuracy_pct: u32,
    /// Sum of half of each qualifying change, a lower bound on inflation.
    pub mmr_inflated_estimate: i64,
}

/// Net rating change split by matchmaking queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueTotals {
    /// Net change across solo queue matches.
    pub solo: i64,
    /// Net change across party queue matches.
    pub party: i64,
}

/// Net rating change attributed to a single hero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeroStanding {
    /// Hero identifier.
    pub hero_id: i32,
    /// Display name, when the hero is known.
    pub name: Option<&'static str>,
    /// Sum of rating changes across matches on this hero.
    pub net_change: i64,
}

/// Statistics and series computed over a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Schema the dataset was interpreted with.
    pub schema: SchemaVariant,
    /// Number of matches analysed.
    pub matches: usize,
    /// Rating after the most recent match.
    pub current_rank: Option<i64>,
    /// Chart points, most recent first.
    pub series: Vec<SeriesPoint>,
    /// Double-down heuristics.
    pub double_down: DoubleDownStats,
    /// Net change per known hero; present for the rich schema only.
    pub hero_net_change: Option<BTreeMap<i32, i64>>,
    /// Net change per queue; present for the rich schema only.
    pub queue_totals: Option<QueueTotals>,
}

impl Report {
    /// Chart points oldest first, ready for plotting left to right.
    pub fn chronological_series(&self) -> impl Iterator<Item = &SeriesPoint> + '_ {
        self.series.iter().rev()
    }

    /// Heroes ordered by net change, best first.
    pub fn hero_ranking(&self) -> Vec<HeroStanding> {
        let Some(per_hero) = &self.hero_net_change else {
            return Vec::new();
        };
        let mut standings: Vec<HeroStanding> = per_hero
            .iter()
            .filter(|(hero_id, _)| **hero_id != 0)
            .map(|(&hero_id, &net_change)| HeroStanding {
                hero_id,
                name: hero_name(hero_id),
                net_change,
            })
            .collect();
        standings.sort_by(|a, b| {
            b.net_change
                .cmp(&a.net_change)
                .then(a.hero_id.cmp(&b.hero_id))
        });
        standings
    }
}
