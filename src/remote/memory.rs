//! # In-Process Remote Backend
//!
//! A remote server held in memory, used by the test suites and by
//! single-site development where no central server is reachable. Applies
//! the same deterministic revision rule as the local store so push and
//! pull converge on the same winners.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::errors::{RemoteError, RemoteResult};
use super::{RemoteBackend, RemoteChanges, RemoteInfo, RemoteStore};
use crate::store::Document;

#[derive(Default)]
struct MemInner {
    docs: HashMap<String, Document>,
    doc_seqs: HashMap<String, u64>,
    seq_index: BTreeMap<u64, String>,
    update_seq: u64,
}

/// One in-process remote store.
pub struct MemoryRemoteStore {
    url: String,
    available: AtomicBool,
    inner: RwLock<MemInner>,
}

impl MemoryRemoteStore {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            available: AtomicBool::new(true),
            inner: RwLock::new(MemInner::default()),
        }
    }

    /// Simulate an outage: while unavailable, every operation fails with a
    /// transport error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> RemoteResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Transport(format!(
                "connection refused: {}",
                self.url
            )))
        }
    }

    /// Read a document as stored remotely, tombstones included.
    pub fn get(&self, id: &str) -> Option<Document> {
        self.inner.read().ok()?.docs.get(id).cloned()
    }

    /// Write a document on the remote side directly, as another site would.
    pub fn seed(&self, doc: Document) {
        if let Ok(mut inner) = self.inner.write() {
            Self::commit(&mut inner, doc);
        }
    }

    fn commit(inner: &mut MemInner, doc: Document) {
        inner.update_seq += 1;
        let seq = inner.update_seq;
        if let Some(stale) = inner.doc_seqs.insert(doc.id.clone(), seq) {
            inner.seq_index.remove(&stale);
        }
        inner.seq_index.insert(seq, doc.id.clone());
        inner.docs.insert(doc.id.clone(), doc);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn info(&self) -> RemoteResult<RemoteInfo> {
        self.check_available()?;
        let inner = self
            .inner
            .read()
            .map_err(|_| RemoteError::Transport("remote state poisoned".into()))?;
        let tombstones = inner.docs.values().filter(|d| d.deleted).count() as u64;
        Ok(RemoteInfo {
            name: self.url.clone(),
            doc_count: inner.docs.len() as u64 - tombstones,
            update_seq: inner.update_seq,
        })
    }

    async fn changes_since(&self, since: u64, limit: usize) -> RemoteResult<RemoteChanges> {
        self.check_available()?;
        let inner = self
            .inner
            .read()
            .map_err(|_| RemoteError::Transport("remote state poisoned".into()))?;

        let mut docs = Vec::new();
        let mut last_seq = since;
        let mut pending = 0u64;
        for (seq, id) in inner.seq_index.range(since + 1..) {
            if docs.len() < limit {
                last_seq = *seq;
                if let Some(doc) = inner.docs.get(id) {
                    docs.push(doc.clone());
                }
            } else {
                pending += 1;
            }
        }
        Ok(RemoteChanges {
            docs,
            last_seq,
            pending,
        })
    }

    async fn push(&self, docs: &[Document]) -> RemoteResult<usize> {
        self.check_available()?;
        let mut inner = self
            .inner
            .write()
            .map_err(|_| RemoteError::Transport("remote state poisoned".into()))?;
        let mut applied = 0;
        for incoming in docs {
            let wins = match inner.docs.get(&incoming.id) {
                Some(current) => incoming.rev.supersedes(&current.rev),
                None => true,
            };
            if wins {
                Self::commit(&mut inner, incoming.clone());
                applied += 1;
            }
        }
        Ok(applied)
    }
}

/// In-process remote backend: a map of stores keyed by URL.
#[derive(Default)]
pub struct MemoryRemoteBackend {
    stores: RwLock<HashMap<String, Arc<MemoryRemoteStore>>>,
    provision_count: AtomicU64,
    reachable: AtomicBool,
}

impl MemoryRemoteBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            provision_count: AtomicU64::new(0),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate the whole server being down for existence probes.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// How many provisioning requests have been issued.
    pub fn provision_count(&self) -> u64 {
        self.provision_count.load(Ordering::SeqCst)
    }

    /// Direct handle to a store, for inspection and fault injection.
    pub fn store(&self, url: &str) -> Option<Arc<MemoryRemoteStore>> {
        self.stores.read().ok()?.get(url).cloned()
    }

    fn open_or_create(&self, url: &str) -> Arc<MemoryRemoteStore> {
        if let Some(existing) = self.store(url) {
            return existing;
        }
        let store = Arc::new(MemoryRemoteStore::new(url));
        if let Ok(mut stores) = self.stores.write() {
            stores.insert(url.to_string(), store.clone());
        }
        store
    }
}

#[async_trait]
impl RemoteBackend for MemoryRemoteBackend {
    async fn ensure(&self, url: &str) -> RemoteResult<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        // Probe answers 2xx: nothing to provision.
        if self.store(url).is_some() {
            return Ok(());
        }
        self.provision_count.fetch_add(1, Ordering::SeqCst);
        self.open_or_create(url);
        Ok(())
    }

    fn open(&self, url: &str) -> Arc<dyn RemoteStore> {
        self.open_or_create(url)
    }
}
