use serde::{Deserialize, Serialize};
use showmmr_core::{MatchId, MatchRecord};

/// Request for one page of match history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub account_id: u32,
    pub matches_requested: u32,
    /// Unset means "start from the most recent match".
    pub start_at_match_id: Option<MatchId>,
}

/// One page of match history, in the order the service produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPage {
    pub matches: Vec<MatchRecord>,
}

impl MatchPage {
    pub fn new(matches: Vec<MatchRecord>) -> Self {
        Self { matches }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Everything a remote service can tell the sync session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    LoggedOn { account_id: u32 },
    LogOnFailed { reason: String },
    /// The service accepted the session and will answer page requests.
    Welcome { version: u32 },
    MatchHistory(MatchPage),
    LoggedOff,
    Disconnected { reason: String },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connected",
            SessionEvent::LoggedOn { .. } => "logged_on",
            SessionEvent::LogOnFailed { .. } => "log_on_failed",
            SessionEvent::Welcome { .. } => "welcome",
            SessionEvent::MatchHistory(_) => "match_history",
            SessionEvent::LoggedOff => "logged_off",
            SessionEvent::Disconnected { .. } => "disconnected",
        }
    }
}
