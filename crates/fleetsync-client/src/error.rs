//! Error types for record store operations

use std::sync::Arc;

use thiserror::Error;

/// Result type alias for record store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while talking to the record store.
///
/// `Clone` so one failed login can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Credentials rejected, or no session token after login
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Store reported the session as expired or unauthorized
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Store reported a domain failure
    #[error("Remote service error in {service}: {message}")]
    RemoteService { service: String, message: String },

    /// Response could not be decoded or parsed
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    /// Request exceeded its timeout
    #[error("Request timed out")]
    Timeout,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl StoreError {
    /// Create a remote service error from the service name and store message
    pub fn remote(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Whether the store rejected the session token
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(Arc::new(err))
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
