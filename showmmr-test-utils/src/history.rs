use showmmr_core::{MatchId, MatchRecord};

/// Start time of match id 1 in [`MatchHistory::synthetic`].
const SYNTHETIC_T0: u32 = 1_720_000_000;

/// Whether `start_at_match_id` names the first record returned or the one
/// before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorSemantics {
    #[default]
    Exclusive,
    Inclusive,
}

/// Remote-side match history for one account, most recent first.
#[derive(Clone, Debug, Default)]
pub struct MatchHistory {
    matches: Vec<MatchRecord>,
    cursor: CursorSemantics,
}

impl MatchHistory {
    pub fn new(mut matches: Vec<MatchRecord>) -> Self {
        matches.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then(b.match_id.cmp(&a.match_id))
        });
        Self {
            matches,
            cursor: CursorSemantics::default(),
        }
    }

    /// `count` ranked matches with ids `1..=count`, one minute apart,
    /// alternating wins and losses of 25.
    pub fn synthetic(count: u64) -> Self {
        let matches = (1..=count)
            .map(|id| {
                let change = if id % 2 == 0 { 25 } else { -25 };
                MatchRecord::new(id, SYNTHETIC_T0 + id as u32 * 60, 3_000, change)
            })
            .collect();
        Self::new(matches)
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: CursorSemantics) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Up to `requested` records starting at `cursor`.
    pub fn page(&self, requested: usize, cursor: Option<MatchId>) -> Vec<MatchRecord> {
        let start = match cursor {
            None => 0,
            Some(cursor) => match self.matches.iter().position(|m| m.match_id == cursor) {
                Some(pos) if self.cursor == CursorSemantics::Inclusive => pos,
                Some(pos) => pos + 1,
                None => self
                    .matches
                    .iter()
                    .position(|m| m.match_id < cursor)
                    .unwrap_or(self.matches.len()),
            },
        };
        self.matches.iter().skip(start).take(requested).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(records: &[MatchRecord]) -> Vec<MatchId> {
        records.iter().map(|m| m.match_id).collect()
    }

    #[test]
    fn exclusive_cursor_skips_the_named_match() {
        let history = MatchHistory::synthetic(5);
        assert_eq!(ids(&history.page(2, None)), vec![5, 4]);
        assert_eq!(ids(&history.page(2, Some(4))), vec![3, 2]);
        assert_eq!(ids(&history.page(10, Some(2))), vec![1]);
        assert!(history.page(10, Some(1)).is_empty());
    }

    #[test]
    fn inclusive_cursor_repeats_the_named_match() {
        let history = MatchHistory::synthetic(5).with_cursor(CursorSemantics::Inclusive);
        assert_eq!(ids(&history.page(2, Some(4))), vec![4, 3]);
    }

    #[test]
    fn unknown_cursor_resumes_below_it() {
        let history = MatchHistory::new(vec![
            MatchRecord::new(10, 100, 3_000, 25),
            MatchRecord::new(30, 300, 3_000, 25),
            MatchRecord::new(20, 200, 3_000, 25),
        ]);
        assert_eq!(ids(history.records()), vec![30, 20, 10]);
        assert_eq!(ids(&history.page(5, Some(25))), vec![20, 10]);
    }
}
