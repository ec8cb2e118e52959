use async_trait::async_trait;

use crate::{PageRequest, SessionEvent, SyncResult};

/// Session-based source of paginated match history.
///
/// Responses are not returned from [`request_page`](Self::request_page); they
/// arrive later through [`next_event`](Self::next_event) as
/// [`SessionEvent::MatchHistory`].
#[async_trait]
pub trait RemoteMatchService: Send {
    /// Wait for the next session event. `None` once the service has shut down.
    async fn next_event(&mut self) -> Option<SessionEvent>;

    /// Ask for a page of history.
    async fn request_page(&mut self, request: PageRequest) -> SyncResult<()>;

    /// Close the session. Further events are not delivered.
    async fn disconnect(&mut self);
}
