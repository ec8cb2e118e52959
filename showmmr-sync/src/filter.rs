use std::fmt;

use showmmr_core::{MatchRecord, SchemaVariant, PARTY_MMR_REMOVAL_EPOCH};

/// Reason a fetched record was kept out of the dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    MissingStartTime,
    MissingMatchId,
    RankChangePending,
    PreviousRankPending,
    /// Party-queue rating reported for a match before party MMR existed.
    PartyBeforeRemoval,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::MissingStartTime => "missing start time",
            Rejection::MissingMatchId => "missing match id",
            Rejection::RankChangePending => "rank change not computed",
            Rejection::PreviousRankPending => "previous rank not computed",
            Rejection::PartyBeforeRemoval => "party rank before party mmr existed",
        };
        f.write_str(text)
    }
}

/// Admission policy for fetched records.
#[derive(Clone, Copy, Debug)]
pub struct RecordFilter {
    schema: SchemaVariant,
}

impl RecordFilter {
    pub fn new(schema: SchemaVariant) -> Self {
        Self { schema }
    }

    pub fn is_admissible(&self, record: &MatchRecord) -> bool {
        self.check(record).is_ok()
    }

    pub fn check(&self, record: &MatchRecord) -> Result<(), Rejection> {
        if record.start_time == 0 {
            return Err(Rejection::MissingStartTime);
        }
        if record.match_id == 0 {
            return Err(Rejection::MissingMatchId);
        }
        if record.rank_change == 0 {
            return Err(Rejection::RankChangePending);
        }
        if record.previous_rank == 0 {
            return Err(Rejection::PreviousRankPending);
        }
        if self.schema.is_rich() && record.start_time < PARTY_MMR_REMOVAL_EPOCH && !record.solo_rank
        {
            return Err(Rejection::PartyBeforeRemoval);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECENT: u32 = PARTY_MMR_REMOVAL_EPOCH + 3_600;
    const OLD: u32 = PARTY_MMR_REMOVAL_EPOCH - 3_600;

    #[test]
    fn sentinel_zeroes_are_rejected() {
        let filter = RecordFilter::new(SchemaVariant::Minimal);
        assert!(filter.is_admissible(&MatchRecord::new(1, RECENT, 3_000, 25)));
        assert_eq!(
            filter.check(&MatchRecord::new(1, 0, 3_000, 25)),
            Err(Rejection::MissingStartTime)
        );
        assert_eq!(
            filter.check(&MatchRecord::new(0, RECENT, 3_000, 25)),
            Err(Rejection::MissingMatchId)
        );
        assert_eq!(
            filter.check(&MatchRecord::new(1, RECENT, 3_000, 0)),
            Err(Rejection::RankChangePending)
        );
        assert_eq!(
            filter.check(&MatchRecord::new(1, RECENT, 0, 25)),
            Err(Rejection::PreviousRankPending)
        );
    }

    #[test]
    fn old_party_matches_only_rejected_under_rich_schema() {
        let party = MatchRecord::new(1, OLD, 3_000, 25).with_solo_rank(false);
        assert_eq!(
            RecordFilter::new(SchemaVariant::Rich).check(&party),
            Err(Rejection::PartyBeforeRemoval)
        );
        assert!(RecordFilter::new(SchemaVariant::Minimal).is_admissible(&party));

        let rich = RecordFilter::new(SchemaVariant::Rich);
        assert!(rich.is_admissible(&party.with_solo_rank(true)));
        assert!(rich.is_admissible(&MatchRecord::new(1, RECENT, 3_000, 25).with_solo_rank(false)));
        assert!(rich.is_admissible(
            &MatchRecord::new(1, PARTY_MMR_REMOVAL_EPOCH, 3_000, 25).with_solo_rank(false)
        ));
    }
}
