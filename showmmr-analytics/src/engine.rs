//! Single pass aggregation over a most-recent-first dataset.

use std::collections::BTreeMap;

use chrono::{Local, TimeZone};
use showmmr_core::{local_time, MatchRecord, SchemaVariant, CROWNFALL_EPOCH};

use crate::report::{DoubleDownStats, QueueTotals, Report, SeriesPoint};

/// Smallest absolute change that is not counted as a double-down.
const DOUBLE_DOWN_THRESHOLD: u32 = 40;

/// Computes [`Report`]s for datasets stored under a given schema.
#[derive(Clone, Copy, Debug)]
pub struct AnalyticsEngine {
    schema: SchemaVariant,
    double_down_threshold: u32,
    double_down_since: u32,
}

impl AnalyticsEngine {
    /// Creates an engine for the given schema with the default heuristics.
    pub fn new(schema: SchemaVariant) -> Self {
        Self {
            schema,
            double_down_threshold: DOUBLE_DOWN_THRESHOLD,
            double_down_since: CROWNFALL_EPOCH,
        }
    }

    /// Computes a report with series timestamps in the machine's local time.
    pub fn compute<'a>(&self, records: impl IntoIterator<Item = &'a MatchRecord>) -> Report {
        self.compute_in(records, &Local)
    }

    /// Computes a report with series timestamps rendered in `tz`.
    pub fn compute_in<'a, Tz: TimeZone>(
        &self,
        records: impl IntoIterator<Item = &'a MatchRecord>,
        tz: &Tz,
    ) -> Report {
        let rich = self.schema.is_rich();
        let mut current_rank = None;
        let mut series = Vec::new();
        let mut double_down = DoubleDownStats::default();
        let mut per_hero: BTreeMap<i32, i64> = BTreeMap::new();
        let mut queues = QueueTotals::default();

        for record in records {
            if current_rank.is_none() {
                current_rank = Some(record.rank_after());
            }
            series.push(SeriesPoint {
                match_id: record.match_id,
                at: local_time(record.start_time, tz).fixed_offset(),
                rank: record.displayed_rank(self.schema),
            });

            if self.is_double_down(record) {
                double_down.count += 1;
                if record.rank_change > 0 {
                    double_down.wins += 1;
                }
                double_down.mmr_inflated_estimate += i64::from(record.rank_change / 2);
            }

            if rich {
                let change = i64::from(record.rank_change);
                if record.hero_id != 0 {
                    *per_hero.entry(record.hero_id).or_default() += change;
                }
                if record.solo_rank {
                    queues.solo += change;
                } else {
                    queues.party += change;
                }
            }
        }

        if double_down.count > 0 {
            double_down.accuracy_pct = 100 * double_down.wins / double_down.count;
        }

        Report {
            schema: self.schema,
            matches: series.len(),
            current_rank,
            series,
            double_down,
            hero_net_change: rich.then_some(per_hero),
            queue_totals: rich.then_some(queues),
        }
    }

    fn is_double_down(&self, record: &MatchRecord) -> bool {
        record.rank_change.unsigned_abs() > self.double_down_threshold
            && record.start_time > self.double_down_since
    }
}
