//! Remote Endpoint Subsystem
//!
//! Everything that talks to the central server: the existence ensurer
//! (probe-then-provision), the replication transport, and an in-process
//! backend for tests and serverless development.
//!
//! The transport seam is the `RemoteStore` trait; sessions never know
//! whether they are speaking HTTP or memory.

mod client;
mod errors;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::Document;

pub use client::{HttpRemoteBackend, HttpRemoteStore, RemoteCredentials};
pub use errors::{RemoteError, RemoteResult};
pub use memory::{MemoryRemoteBackend, MemoryRemoteStore};

/// Remote store metadata, read during health verification and heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteInfo {
    /// Remote store identifier
    pub name: String,
    /// Live document count
    pub doc_count: u64,
    /// Latest committed update sequence
    pub update_seq: u64,
}

/// A commit-ordered page of remote changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChanges {
    /// Documents in commit order, tombstones included
    pub docs: Vec<Document>,
    /// Sequence to checkpoint after applying this page
    pub last_seq: u64,
    /// Changes left beyond this page
    pub pending: u64,
}

/// One remote store endpoint as seen by a replication session.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Metadata read (health verification, heartbeat).
    async fn info(&self) -> RemoteResult<RemoteInfo>;

    /// Changes committed after `since`, at most `limit` documents.
    async fn changes_since(&self, since: u64, limit: usize) -> RemoteResult<RemoteChanges>;

    /// Apply a batch of documents; returns how many were written.
    async fn push(&self, docs: &[Document]) -> RemoteResult<usize>;
}

/// Factory for remote stores plus the existence ensurer.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Probe the endpoint; provision it on 404; fail fast on anything
    /// else. Idempotent: an existing endpoint is never re-provisioned.
    async fn ensure(&self, url: &str) -> RemoteResult<()>;

    /// Open a transport handle for the endpoint.
    fn open(&self, url: &str) -> Arc<dyn RemoteStore>;
}
