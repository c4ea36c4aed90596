//! # Session State Machine
//!
//! Explicit enum-tagged states with validated transitions. Each session
//! moves `initializing -> active/paused` in steady operation; `error` and
//! `complete` are terminal for that session instance; recovery happens by
//! the supervisor starting a fresh session, never by resurrecting an
//! errored one.

use super::errors::{SyncError, SyncResult};

/// State of one replication session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Session created; remote health not yet verified
    Initializing,

    /// Caught-up replication with batches flowing
    Active,

    /// Live session with nothing to send or receive. The expected steady
    /// state, not a failure; may carry a transient cause.
    Paused {
        /// Why the session paused, when known
        reason: Option<String>,
    },

    /// Transport or protocol failure; the session is cancelled and a
    /// replacement is scheduled by the supervisor
    Error {
        /// Recorded failure message
        message: String,
    },

    /// Explicitly stopped; no further events fire
    Complete,
}

impl SessionState {
    /// Status string as published in `sync:status` events.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Paused { .. } => "paused",
            SessionState::Error { .. } => "error",
            SessionState::Complete => "complete",
        }
    }

    /// Whether this session instance can make no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Error { .. } | SessionState::Complete)
    }

    /// Validated transition; terminal states reject everything.
    pub fn transition(self, next: SessionState) -> SyncResult<SessionState> {
        let allowed = match (&self, &next) {
            // Re-entering the same state refreshes its payload.
            (a, b) if std::mem::discriminant(a) == std::mem::discriminant(b) => !a.is_terminal(),
            (SessionState::Initializing, _) => true,
            (SessionState::Active, SessionState::Initializing) => false,
            (SessionState::Active, _) => true,
            (SessionState::Paused { .. }, SessionState::Initializing) => false,
            (SessionState::Paused { .. }, _) => true,
            (SessionState::Error { .. }, _) | (SessionState::Complete, _) => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(SyncError::IllegalTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}
