//! Error types for the sync engine

use fleetsync_client::StoreError;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by a sync cycle
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// A store call failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every attempt failed; the cycle's observations were dropped
    #[error("sync cycle failed after {attempts} attempt(s): {last}")]
    AttemptsExhausted {
        attempts: u32,
        #[source]
        last: StoreError,
    },

    /// A provider feed could not be fetched
    #[error("position source '{provider}' failed: {message}")]
    Source { provider: String, message: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn source_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
