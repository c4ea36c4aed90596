//! Replication Session Subsystem
//!
//! The state machine, worker, and supervisor behind each store's
//! continuous bidirectional replication:
//!
//! - Sessions are strictly sequential within a store; stores run
//!   concurrently relative to each other
//! - A transport failure cancels the session and schedules exactly one
//!   replacement after a fixed delay; the retry ceiling is injectable and
//!   unbounded by default
//! - `complete` is reachable only by explicit stop while live

mod errors;
mod options;
mod session;
mod state;
mod supervisor;

pub use errors::{SyncError, SyncResult};
pub use options::SessionOptions;
pub use session::{ReplicationSession, SyncCheckpoint};
pub use state::SessionState;
pub use supervisor::{spawn, SessionHandle};
