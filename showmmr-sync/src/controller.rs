use std::fmt;

use showmmr_core::{MatchId, SyncMode};
use showmmr_ledger::{MergeOutcome, MergeStore};
use tracing::{debug, info};

use crate::{MatchPage, PageRequest, RecordFilter};

/// Largest page the remote service will serve.
pub const PAGE_SIZE_CAP: u32 = 20;

/// Why a sync session stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The budget was zero, so no page was ever requested.
    NothingRequested,
    /// A fetched record matched the newest previously persisted match.
    BoundaryReached,
    BudgetExhausted,
    EmptyPage,
    /// The service returned fewer records than requested.
    ShortPage,
    LogOnFailed { reason: String },
    Disconnected { reason: String },
    Cancelled,
}

impl Termination {
    /// Whether the session ended for one of the expected paging reasons.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Termination::NothingRequested
                | Termination::BoundaryReached
                | Termination::BudgetExhausted
                | Termination::EmptyPage
                | Termination::ShortPage
        )
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::NothingRequested => f.write_str("no matches requested"),
            Termination::BoundaryReached => f.write_str("reached previously synced matches"),
            Termination::BudgetExhausted => f.write_str("requested match count fetched"),
            Termination::EmptyPage => f.write_str("empty response received"),
            Termination::ShortPage => f.write_str("end of match history"),
            Termination::LogOnFailed { reason } => write!(f, "log on failed: {reason}"),
            Termination::Disconnected { reason } => write!(f, "disconnected: {reason}"),
            Termination::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Counters accumulated over a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub pages: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

/// What the caller should do after a page was processed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageVerdict {
    /// Request another page.
    Continue,
    Finished(Termination),
    /// A page arrived while no request was outstanding; it was dropped.
    Unsolicited,
}

/// Pagination state machine: budget, cursor and termination rules.
#[derive(Clone, Debug)]
pub struct FetchController {
    filter: RecordFilter,
    mode: SyncMode,
    page_size_cap: u32,
    remaining: u32,
    cursor: Option<MatchId>,
    in_flight: Option<u32>,
    termination: Option<Termination>,
    stats: SyncStats,
}

impl FetchController {
    pub fn new(budget: u32, filter: RecordFilter) -> Self {
        Self {
            filter,
            mode: SyncMode::Incremental,
            page_size_cap: PAGE_SIZE_CAP,
            remaining: budget,
            cursor: None,
            in_flight: None,
            termination: None,
            stats: SyncStats::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_page_size_cap(mut self, cap: u32) -> Self {
        self.page_size_cap = cap.clamp(1, PAGE_SIZE_CAP);
        self
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn cursor(&self) -> Option<MatchId> {
        self.cursor
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.termination.is_some()
    }

    pub fn has_request_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Reserve budget for the next page. `None` once finished, while a
    /// request is outstanding, or when nothing is left to ask for.
    pub fn next_request(&mut self, account_id: u32) -> Option<PageRequest> {
        if self.is_finished() || self.in_flight.is_some() {
            return None;
        }
        if self.remaining == 0 {
            let reason = if self.stats.pages == 0 {
                Termination::NothingRequested
            } else {
                Termination::BudgetExhausted
            };
            self.finish(reason);
            return None;
        }
        let requested = self.page_size_cap.min(self.remaining);
        self.remaining -= requested;
        self.in_flight = Some(requested);
        Some(PageRequest {
            account_id,
            matches_requested: requested,
            start_at_match_id: self.cursor,
        })
    }

    /// Feed one page of results through the filter into `store`.
    pub fn process_page(&mut self, page: &MatchPage, store: &mut MergeStore) -> PageVerdict {
        if let Some(termination) = &self.termination {
            return PageVerdict::Finished(termination.clone());
        }
        let Some(requested) = self.in_flight.take() else {
            debug!(len = page.len(), "dropping unsolicited page");
            return PageVerdict::Unsolicited;
        };
        self.stats.pages += 1;
        self.stats.fetched += page.len();

        for record in &page.matches {
            self.cursor = Some(record.match_id);
            if let Err(reason) = self.filter.check(record) {
                self.stats.rejected += 1;
                debug!(match_id = record.match_id, %reason, "skipping match");
                continue;
            }
            match store.merge(*record) {
                MergeOutcome::Inserted => self.stats.inserted += 1,
                MergeOutcome::Duplicate => self.stats.duplicates += 1,
                MergeOutcome::Boundary => match self.mode {
                    SyncMode::Incremental => {
                        info!(match_id = record.match_id, "reached previously synced match");
                        return self.finish(Termination::BoundaryReached);
                    }
                    SyncMode::Backfill => {
                        self.cursor = store.oldest().map(|oldest| oldest.match_id);
                        info!(
                            match_id = record.match_id,
                            cursor = ?self.cursor,
                            "reached previously synced match, continuing past oldest"
                        );
                        break;
                    }
                },
            }
        }

        if page.is_empty() {
            self.finish(Termination::EmptyPage)
        } else if page.len() < requested as usize {
            self.finish(Termination::ShortPage)
        } else if self.remaining == 0 {
            self.finish(Termination::BudgetExhausted)
        } else {
            info!(
                remaining = self.remaining,
                start_at = ?self.cursor,
                "matches remaining"
            );
            PageVerdict::Continue
        }
    }

    /// End the session for a reason outside the paging rules. The first
    /// termination recorded wins.
    pub fn abort(&mut self, termination: Termination) -> Termination {
        self.in_flight = None;
        self.termination.get_or_insert(termination).clone()
    }

    fn finish(&mut self, termination: Termination) -> PageVerdict {
        PageVerdict::Finished(self.abort(termination))
    }
}

#[cfg(test)]
mod tests {
    use showmmr_core::{MatchRecord, SchemaVariant};

    use super::*;

    const T0: u32 = 1_720_000_000;

    fn rec(match_id: MatchId) -> MatchRecord {
        MatchRecord::new(match_id, T0 + match_id as u32, 3_000, 25)
    }

    fn page(ids: &[MatchId]) -> MatchPage {
        MatchPage::new(ids.iter().copied().map(rec).collect())
    }

    fn controller(budget: u32) -> FetchController {
        FetchController::new(budget, RecordFilter::new(SchemaVariant::Rich))
    }

    #[test]
    fn budget_is_split_into_capped_pages() {
        let mut ctl = controller(45);
        let mut store = MergeStore::new();

        let first = ctl.next_request(7).unwrap();
        assert_eq!(first.matches_requested, 20);
        assert_eq!(first.start_at_match_id, None);
        assert_eq!(ctl.next_request(7), None, "one request at a time");
        let ids: Vec<MatchId> = (181..=200).rev().collect();
        assert_eq!(ctl.process_page(&page(&ids), &mut store), PageVerdict::Continue);

        let second = ctl.next_request(7).unwrap();
        assert_eq!(second.matches_requested, 20);
        assert_eq!(second.start_at_match_id, Some(181));
        let ids: Vec<MatchId> = (161..=180).rev().collect();
        assert_eq!(ctl.process_page(&page(&ids), &mut store), PageVerdict::Continue);

        let third = ctl.next_request(7).unwrap();
        assert_eq!(third.matches_requested, 5);
        assert_eq!(ctl.remaining(), 0);
        let ids: Vec<MatchId> = (156..=160).rev().collect();
        assert_eq!(
            ctl.process_page(&page(&ids), &mut store),
            PageVerdict::Finished(Termination::BudgetExhausted)
        );
        assert_eq!(store.len(), 45);
        assert_eq!(ctl.stats().pages, 3);
    }

    #[test]
    fn boundary_stops_mid_page() {
        let mut store = MergeStore::from_records(vec![rec(100), rec(99)]);
        let mut ctl = controller(20);
        ctl.next_request(1).unwrap();
        let verdict = ctl.process_page(&page(&[105, 103, 100, 99]), &mut store);
        assert_eq!(verdict, PageVerdict::Finished(Termination::BoundaryReached));
        assert_eq!(ctl.stats().inserted, 2);
        assert_eq!(
            store.records().map(|r| r.match_id).collect::<Vec<_>>(),
            vec![105, 103, 100, 99]
        );
        assert_eq!(ctl.cursor(), Some(100));
        assert_eq!(ctl.next_request(1), None);
    }

    #[test]
    fn rejected_records_still_advance_cursor() {
        let mut store = MergeStore::new();
        let mut ctl = controller(3);
        ctl.next_request(1).unwrap();
        let mut pending = rec(50);
        pending.rank_change = 0;
        let records = MatchPage::new(vec![rec(52), rec(51), pending]);
        assert_eq!(
            ctl.process_page(&records, &mut store),
            PageVerdict::Finished(Termination::BudgetExhausted)
        );
        assert_eq!(ctl.cursor(), Some(50));
        assert_eq!(ctl.stats().rejected, 1);
        assert!(!store.contains(50));
    }

    #[test]
    fn short_and_empty_pages_terminate() {
        let mut store = MergeStore::new();
        let mut ctl = controller(100);
        ctl.next_request(1).unwrap();
        assert_eq!(
            ctl.process_page(&page(&[10, 9]), &mut store),
            PageVerdict::Finished(Termination::ShortPage)
        );

        let mut ctl = controller(100);
        ctl.next_request(1).unwrap();
        assert_eq!(
            ctl.process_page(&MatchPage::default(), &mut store),
            PageVerdict::Finished(Termination::EmptyPage)
        );
    }

    #[test]
    fn zero_budget_never_requests() {
        let mut ctl = controller(0);
        assert_eq!(ctl.next_request(1), None);
        assert_eq!(ctl.termination(), Some(&Termination::NothingRequested));
    }

    #[test]
    fn repeated_cursor_record_is_counted_as_duplicate() {
        let mut store = MergeStore::new();
        let mut ctl = controller(4).with_page_size_cap(2);
        ctl.next_request(1).unwrap();
        assert_eq!(ctl.process_page(&page(&[9, 8]), &mut store), PageVerdict::Continue);
        let request = ctl.next_request(1).unwrap();
        assert_eq!(request.start_at_match_id, Some(8));
        assert_eq!(
            ctl.process_page(&page(&[8, 7]), &mut store),
            PageVerdict::Finished(Termination::BudgetExhausted)
        );
        assert_eq!(ctl.stats().duplicates, 1);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn backfill_jumps_past_persisted_range() {
        let mut store = MergeStore::from_records(vec![rec(100), rec(90), rec(80)]);
        let mut ctl = controller(40).with_mode(SyncMode::Backfill);
        ctl.next_request(1).unwrap();
        let ids: Vec<MatchId> = vec![
            102, 101, 100, 99, 98, 97, 96, 95, 94, 93, 92, 91, 90, 89, 88, 87, 86, 85, 84, 83,
        ];
        assert_eq!(ctl.process_page(&page(&ids), &mut store), PageVerdict::Continue);
        assert_eq!(ctl.cursor(), Some(80));
        let request = ctl.next_request(1).unwrap();
        assert_eq!(request.start_at_match_id, Some(80));
        assert_eq!(
            ctl.process_page(&page(&[79, 78]), &mut store),
            PageVerdict::Finished(Termination::ShortPage)
        );
        assert_eq!(
            store.records().map(|r| r.match_id).collect::<Vec<_>>(),
            vec![102, 101, 100, 90, 80, 79, 78]
        );
    }

    #[test]
    fn first_termination_wins() {
        let mut ctl = controller(10);
        ctl.next_request(1).unwrap();
        assert_eq!(ctl.abort(Termination::Cancelled), Termination::Cancelled);
        assert_eq!(
            ctl.abort(Termination::Disconnected {
                reason: "late".into()
            }),
            Termination::Cancelled
        );
        let mut store = MergeStore::new();
        assert_eq!(
            ctl.process_page(&page(&[1]), &mut store),
            PageVerdict::Finished(Termination::Cancelled)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn unsolicited_pages_are_dropped() {
        let mut store = MergeStore::new();
        let mut ctl = controller(10);
        assert_eq!(
            ctl.process_page(&page(&[5]), &mut store),
            PageVerdict::Unsolicited
        );
        assert!(store.is_empty());
    }
}
