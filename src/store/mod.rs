//! Local Document Store Subsystem
//!
//! Each logical collection ("orders", "inventory", ...) is a named local
//! store: an append-only checksummed record file plus in-memory state
//! rebuilt on open. Collaborating subsystems obtain a handle from the
//! provisioner by logical name and perform ordinary create/read/update/
//! tombstone operations; they never talk to the remote side directly.
//!
//! - Deletes are tombstone writes, retained forever, so they replicate
//! - Every write gets a fresh revision token; stale writers conflict
//! - The changes feed is strictly commit-ordered per store

mod errors;
mod index;
mod local;
mod provisioner;
pub mod record;

pub use errors::{ProvisionError, ProvisionResult, StoreError, StoreResult};
pub use index::{FieldIndex, IndexSpec};
pub use local::{ChangeSet, LocalStore, StoreInfo};
pub use provisioner::{StoreProvisioner, PROBE_ATTEMPTS, PROBE_BACKOFF_STEP};
pub use record::{Document, Revision};
