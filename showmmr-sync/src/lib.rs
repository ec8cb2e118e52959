//! Paginated synchronization of match history into a [`showmmr_ledger::MergeStore`].
//!
//! The session is event driven: a [`RemoteMatchService`] produces
//! [`SessionEvent`]s, [`SyncSession::step`] turns each one into the next
//! action, and [`SyncSession::run`] resolves once with the first
//! [`Termination`] reached.

mod controller;
mod credentials;
mod error;
mod event;
mod filter;
mod http;
mod service;
mod session;
mod shutdown;

pub use controller::{FetchController, PageVerdict, SyncStats, Termination, PAGE_SIZE_CAP};
pub use credentials::{CellIdCache, TokenCache};
pub use error::{SyncError, SyncResult};
pub use event::{MatchPage, PageRequest, SessionEvent};
pub use filter::{RecordFilter, Rejection};
pub use http::{Credentials, HttpMatchService, HttpSessionConfig};
pub use service::RemoteMatchService;
pub use session::{Step, SyncOutcome, SyncSession};
pub use shutdown::ShutdownSignal;
