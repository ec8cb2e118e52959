use thiserror::Error;

/// Result alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type surfaced by the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("session is closed")]
    SessionClosed,
    #[error("credential cache error: {0}")]
    Cache(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(value: std::io::Error) -> Self {
        Self::Cache(value.to_string())
    }
}
