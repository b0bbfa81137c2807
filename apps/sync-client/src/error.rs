use thiserror::Error;

/// Errors surfaced by the synchronization engine.
///
/// `Transport` failures are recovered internally by the connection manager's
/// retry loop; callers only see them when opening a connection is impossible.
/// `Auth` is terminal: the silent refresh-and-retry already happened by the
/// time one of these escapes the API client.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether a failed call is worth retrying at all. Auth failures are
    /// terminal and client-side decode bugs won't fix themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport(_) | SyncError::Http(_) => true,
            SyncError::Api { status, .. } => *status >= 500,
            SyncError::Auth(_) | SyncError::Decode(_) => false,
        }
    }
}
