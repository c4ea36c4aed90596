//! # Remote Errors
//!
//! One store's remote-side failure never aborts the others: the
//! orchestrator records it and moves on, and in-flight transport failures
//! are recovered by the session supervisor.

use thiserror::Error;

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote endpoint errors
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Existence probe failed: a non-success, non-404 status, or no
    /// response at all. Not retried by the ensurer; that store's setup
    /// fails.
    #[error("remote endpoint unreachable: {url}: {reason}")]
    Unreachable {
        /// Probed endpoint
        url: String,
        /// Status observed, or the connection-level failure
        reason: String,
    },

    /// Provisioning request failed after a 404 probe
    #[error("remote provisioning failed for {url} ({status}): {body}")]
    Provision {
        /// Provisioned endpoint
        url: String,
        /// HTTP status observed
        status: u16,
        /// Response body text
        body: String,
    },

    /// In-flight transport failure (connection, protocol, non-2xx batch)
    #[error("transport failure: {0}")]
    Transport(String),

    /// Request exceeded the configured network timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Response body did not match the wire contract
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}
