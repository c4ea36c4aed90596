//! # Sync Session Errors
//!
//! Transport failures during live replication are never fatal to the
//! caller: the supervisor records them, cancels the session, and schedules
//! a replacement. These types exist so the failure is typed on its way
//! into the metrics table.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for session operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Replication session errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport or protocol failure mid-replication, including missed
    /// heartbeats and request timeouts
    #[error("transport failure on store '{store}': {message}")]
    Transport {
        /// Logical store name
        store: String,
        /// Underlying failure
        message: String,
    },

    /// Attempted state machine transition that is not allowed
    #[error("illegal session transition from '{from}' to '{to}'")]
    IllegalTransition {
        /// Current status
        from: &'static str,
        /// Requested status
        to: &'static str,
    },

    /// Local store failure while applying a replicated batch
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Shared checkpoint lock poisoned by a panicked session
    #[error("checkpoint lock poisoned for store '{0}'")]
    CheckpointPoisoned(String),
}

impl SyncError {
    /// Tag a transport-level failure with its store.
    pub fn transport(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            store: store.into(),
            message: message.into(),
        }
    }
}
