//! Unified error handling for the client.

use crate::config::ConfigError;
use crate::persist::StoreError;
use crate::remote::RemoteError;

/// Errors surfaced by [`SyncEngine`](crate::SyncEngine) operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("offline and optimistic updates are disabled")]
    Offline,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] tablesync_engine::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized(message) => SyncError::Unauthorized(message),
            other => SyncError::Remote(other),
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;
