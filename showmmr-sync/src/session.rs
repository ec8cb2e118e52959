use std::time::Duration;

use showmmr_ledger::MergeStore;
use tracing::{debug, info, warn};

use crate::{
    FetchController, PageRequest, PageVerdict, RemoteMatchService, SessionEvent, ShutdownSignal,
    SyncResult, SyncStats, Termination,
};

/// Next action requested by [`SyncSession::step`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing to do until the next event.
    Wait,
    /// Send `request` once `after` has elapsed.
    Send { request: PageRequest, after: Duration },
    Finished(Termination),
}

/// Result of a completed sync session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
    pub termination: Termination,
    /// Account the service logged us in as, if it got that far.
    pub account_id: Option<u32>,
    pub stats: SyncStats,
}

impl SyncOutcome {
    /// Whether the merged dataset should be written back to the ledger.
    pub fn should_persist(&self) -> bool {
        self.account_id.is_some() || self.termination == Termination::NothingRequested
    }
}

/// Session context: owns the pagination state and borrows the dataset it fills.
pub struct SyncSession<'a> {
    controller: FetchController,
    store: &'a mut MergeStore,
    account_id: Option<u32>,
    page_interval: Duration,
}

impl<'a> SyncSession<'a> {
    pub fn new(controller: FetchController, store: &'a mut MergeStore) -> Self {
        Self {
            controller,
            store,
            account_id: None,
            page_interval: Duration::from_secs(1),
        }
    }

    /// Politeness delay between consecutive page requests.
    #[must_use]
    pub fn with_page_interval(mut self, interval: Duration) -> Self {
        self.page_interval = interval;
        self
    }

    pub fn account_id(&self) -> Option<u32> {
        self.account_id
    }

    /// Advance the session by one event.
    pub fn step(&mut self, event: SessionEvent) -> Step {
        debug!(kind = event.kind(), "session event");
        match event {
            SessionEvent::Connected => {
                info!("connected to remote service");
                Step::Wait
            }
            SessionEvent::LoggedOn { account_id } => {
                info!(account_id, "logged on");
                self.account_id = Some(account_id);
                Step::Wait
            }
            SessionEvent::LogOnFailed { reason } => {
                warn!(%reason, "unable to log on");
                Step::Finished(self.controller.abort(Termination::LogOnFailed { reason }))
            }
            SessionEvent::Welcome { version } => {
                info!(version, "remote service is ready");
                self.request_next(Duration::ZERO)
            }
            SessionEvent::MatchHistory(page) => {
                match self.controller.process_page(&page, self.store) {
                    PageVerdict::Continue => self.request_next(self.page_interval),
                    PageVerdict::Finished(termination) => Step::Finished(termination),
                    PageVerdict::Unsolicited => Step::Wait,
                }
            }
            SessionEvent::LoggedOff => {
                info!("logged off");
                Step::Finished(self.controller.abort(Termination::Disconnected {
                    reason: "logged off by remote service".into(),
                }))
            }
            SessionEvent::Disconnected { reason } => {
                info!(%reason, "disconnected from remote service");
                Step::Finished(self.controller.abort(Termination::Disconnected { reason }))
            }
        }
    }

    fn request_next(&mut self, after: Duration) -> Step {
        let Some(account_id) = self.account_id else {
            warn!("remote service ready before log on, waiting");
            return Step::Wait;
        };
        if self.controller.has_request_in_flight() {
            return Step::Wait;
        }
        match self.controller.next_request(account_id) {
            Some(request) => {
                info!(
                    matches_requested = request.matches_requested,
                    start_at = ?request.start_at_match_id,
                    "requesting match history"
                );
                Step::Send { request, after }
            }
            None => match self.controller.termination() {
                Some(termination) => Step::Finished(termination.clone()),
                None => Step::Wait,
            },
        }
    }

    /// Drive the session against `service` until the first termination.
    ///
    /// A zero budget returns immediately without touching the service.
    pub async fn run<S>(mut self, service: &mut S, shutdown: &ShutdownSignal) -> SyncResult<SyncOutcome>
    where
        S: RemoteMatchService + ?Sized,
    {
        if self.controller.remaining() == 0 {
            let termination = self.controller.abort(Termination::NothingRequested);
            return Ok(self.outcome(termination));
        }

        let termination = loop {
            let event = tokio::select! {
                _ = shutdown.wait() => break self.controller.abort(Termination::Cancelled),
                event = service.next_event() => event,
            };
            let Some(event) = event else {
                break self.controller.abort(Termination::Disconnected {
                    reason: "event stream closed".into(),
                });
            };
            match self.step(event) {
                Step::Wait => {}
                Step::Send { request, after } => {
                    if !after.is_zero() {
                        tokio::select! {
                            _ = shutdown.wait() => break self.controller.abort(Termination::Cancelled),
                            _ = tokio::time::sleep(after) => {}
                        }
                    }
                    if let Err(err) = service.request_page(request).await {
                        break self.controller.abort(Termination::Disconnected {
                            reason: err.to_string(),
                        });
                    }
                }
                Step::Finished(termination) => break termination,
            }
        };

        service.disconnect().await;
        let outcome = self.outcome(termination);
        info!(
            termination = %outcome.termination,
            pages = outcome.stats.pages,
            inserted = outcome.stats.inserted,
            "sync session finished"
        );
        Ok(outcome)
    }

    fn outcome(&self, termination: Termination) -> SyncOutcome {
        SyncOutcome {
            termination,
            account_id: self.account_id,
            stats: self.controller.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use showmmr_core::{MatchRecord, SchemaVariant};

    use super::*;
    use crate::{MatchPage, RecordFilter};

    fn rec(match_id: u64) -> MatchRecord {
        MatchRecord::new(match_id, 1_720_000_000 + match_id as u32, 3_000, 25)
    }

    fn session(store: &mut MergeStore, budget: u32) -> SyncSession<'_> {
        let controller = FetchController::new(budget, RecordFilter::new(SchemaVariant::Rich));
        SyncSession::new(controller, store).with_page_interval(Duration::from_millis(250))
    }

    #[test]
    fn welcome_before_log_on_waits() {
        let mut store = MergeStore::new();
        let mut session = session(&mut store, 5);
        assert_eq!(session.step(SessionEvent::Welcome { version: 1 }), Step::Wait);
        assert_eq!(session.step(SessionEvent::LoggedOn { account_id: 9 }), Step::Wait);
        let Step::Send { request, after } = session.step(SessionEvent::Welcome { version: 1 }) else {
            panic!("expected a page request");
        };
        assert_eq!(request.account_id, 9);
        assert_eq!(request.matches_requested, 5);
        assert_eq!(after, Duration::ZERO);
    }

    #[test]
    fn repeated_welcome_does_not_duplicate_requests() {
        let mut store = MergeStore::new();
        let mut session = session(&mut store, 40);
        session.step(SessionEvent::LoggedOn { account_id: 9 });
        assert!(matches!(
            session.step(SessionEvent::Welcome { version: 1 }),
            Step::Send { .. }
        ));
        assert_eq!(session.step(SessionEvent::Welcome { version: 2 }), Step::Wait);
    }

    #[test]
    fn follow_up_pages_wait_for_page_interval() {
        let mut store = MergeStore::new();
        let mut session = session(&mut store, 40);
        session.step(SessionEvent::LoggedOn { account_id: 9 });
        session.step(SessionEvent::Welcome { version: 1 });
        let page = MatchPage::new((1..=20).rev().map(rec).collect());
        let Step::Send { request, after } = session.step(SessionEvent::MatchHistory(page)) else {
            panic!("expected a follow-up request");
        };
        assert_eq!(after, Duration::from_millis(250));
        assert_eq!(request.start_at_match_id, Some(1));
    }

    #[test]
    fn disconnect_after_log_on_keeps_account() {
        let mut store = MergeStore::new();
        let mut session = session(&mut store, 40);
        session.step(SessionEvent::LoggedOn { account_id: 9 });
        let step = session.step(SessionEvent::Disconnected {
            reason: "socket closed".into(),
        });
        assert_eq!(
            step,
            Step::Finished(Termination::Disconnected {
                reason: "socket closed".into()
            })
        );
        assert_eq!(session.account_id(), Some(9));
    }

    #[test]
    fn log_on_failure_finishes_session() {
        let mut store = MergeStore::new();
        let mut session = session(&mut store, 40);
        let step = session.step(SessionEvent::LogOnFailed {
            reason: "bad token".into(),
        });
        assert!(matches!(step, Step::Finished(Termination::LogOnFailed { .. })));
        assert_eq!(session.account_id(), None);
    }

    #[test]
    fn persistence_requires_an_account() {
        let outcome = SyncOutcome {
            termination: Termination::Disconnected {
                reason: "refused".into(),
            },
            account_id: None,
            stats: SyncStats::default(),
        };
        assert!(!outcome.should_persist());
        assert!(SyncOutcome {
            account_id: Some(1),
            ..outcome.clone()
        }
        .should_persist());
        assert!(SyncOutcome {
            termination: Termination::NothingRequested,
            ..outcome
        }
        .should_persist());
    }
}
