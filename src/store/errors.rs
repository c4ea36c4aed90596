//! # Store Errors
//!
//! Error types for the local document store and the provisioner.

use std::io;

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Local document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Disk I/O failure
    #[error("store I/O failure: {context}: {source}")]
    Io {
        /// What the store was doing when the failure occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Record checksum mismatch
    #[error("data corruption in store '{store}' at offset {offset}")]
    Corruption {
        /// Store name
        store: String,
        /// Byte offset of the bad record
        offset: u64,
    },

    /// Record could not be decoded as a document
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Optimistic-concurrency conflict on a collaborator write
    #[error("revision conflict on document '{id}': expected {expected}, got {actual}")]
    RevisionConflict {
        /// Document key
        id: String,
        /// Revision currently stored
        expected: String,
        /// Revision supplied by the writer
        actual: String,
    },

    /// Write against a document that does not exist
    #[error("document not found: {0}")]
    NotFound(String),

    /// Lookup against an index that was never provisioned
    #[error("no index on fields [{0}]")]
    IndexMissing(String),

    /// Invalid revision token
    #[error("invalid revision token: {0}")]
    InvalidRevision(String),

    /// Shared state lock poisoned by a panicked writer
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for provisioning
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Local store unusable after bounded probe attempts.
///
/// Fatal to the whole startup sequence: the orchestrator propagates this
/// instead of continuing with the remaining stores.
#[derive(Debug, Error)]
#[error("failed to provision store '{store}' after {attempts} attempts: {source}")]
pub struct ProvisionError {
    /// Logical store name
    pub store: String,
    /// Probe attempts made before giving up
    pub attempts: u32,
    /// Last failure observed
    #[source]
    pub source: StoreError,
}
