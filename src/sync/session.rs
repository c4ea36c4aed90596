//! # Replication Session
//!
//! One continuous bidirectional session bound to one logical store.
//! Batches move strictly sequentially within a session, so the destination
//! applies them in source commit order; cross-store ordering is neither
//! guaranteed nor needed.
//!
//! The session never retries itself. Any transport failure is recorded,
//! published, and returned to the supervisor, which cancels this instance
//! and schedules exactly one replacement.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::metrics::{ChangeDirection, ChangeSummary, MetricsRegistry};
use crate::remote::RemoteStore;
use crate::store::LocalStore;

use super::errors::{SyncError, SyncResult};
use super::options::SessionOptions;
use super::state::SessionState;

/// Push/pull positions, owned by the supervisor so a replacement session
/// resumes where its predecessor stopped instead of resending history.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncCheckpoint {
    /// Local sequence already pushed to the remote
    pub push_seq: u64,
    /// Remote sequence already applied locally
    pub pull_seq: u64,
}

/// One live replication session.
pub struct ReplicationSession {
    store_name: String,
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    options: SessionOptions,
    metrics: Arc<MetricsRegistry>,
    checkpoint: Arc<Mutex<SyncCheckpoint>>,
    shutdown: watch::Receiver<bool>,
    state: SessionState,
    outstanding_push: u64,
    outstanding_pull: u64,
}

impl ReplicationSession {
    /// Bind a session to a store. It does nothing until `run`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store_name: String,
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        options: SessionOptions,
        metrics: Arc<MetricsRegistry>,
        checkpoint: Arc<Mutex<SyncCheckpoint>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store_name,
            local,
            remote,
            options,
            metrics,
            checkpoint,
            shutdown,
            state: SessionState::Initializing,
            outstanding_push: 0,
            outstanding_pull: 0,
        }
    }

    /// Drive the session until it completes (shutdown, or caught up in
    /// non-live mode) or fails with a transport error.
    pub async fn run(mut self) -> SyncResult<()> {
        self.metrics
            .publish_status(&self.store_name, self.state.as_str(), None);

        // Remote health verification before any writes flow.
        if let Err(e) = self.verify_remote().await {
            return Err(self.fail(e));
        }

        loop {
            if self.shutdown_requested() {
                return self.complete();
            }

            let moved = match self.transfer_cycle().await {
                Ok(moved) => moved,
                Err(e) => return Err(self.fail(e)),
            };
            self.update_total();

            if moved > 0 {
                self.set_state(SessionState::Active);
                continue;
            }

            if !self.options.live {
                return self.complete();
            }

            self.set_state(SessionState::Paused { reason: None });
            if self.idle_wait().await? {
                return self.complete();
            }
        }
    }

    /// Push then pull, up to `max_in_flight_batches` each, sequentially.
    async fn transfer_cycle(&mut self) -> SyncResult<usize> {
        let mut moved = 0;
        for _ in 0..self.options.max_in_flight_batches {
            let n = self.push_batch().await?;
            moved += n;
            if n == 0 {
                break;
            }
        }
        for _ in 0..self.options.max_in_flight_batches {
            let n = self.pull_batch().await?;
            moved += n;
            if n == 0 {
                break;
            }
        }
        Ok(moved)
    }

    /// Transfer one batch of local changes to the remote store.
    async fn push_batch(&mut self) -> SyncResult<usize> {
        let since = self.checkpoint()?.push_seq;
        let page = self
            .local
            .changes_since(since, self.options.batch_size, true)?;
        self.outstanding_push = page.pending;

        if page.docs.is_empty() {
            // Still advance past replicated-origin entries.
            self.advance(|c| c.push_seq = page.last_seq)?;
            return Ok(0);
        }

        let count = page.docs.len();
        match self.with_timeout(self.remote.push(&page.docs)).await {
            Ok(_) => {}
            Err(e) => {
                self.metrics.add_failed(&self.store_name, count as u64);
                return Err(e);
            }
        }

        self.advance(|c| c.push_seq = page.last_seq)?;
        self.metrics.add_completed(&self.store_name, count as u64);
        self.metrics.publish_change(
            &self.store_name,
            ChangeSummary {
                direction: ChangeDirection::Push,
                doc_count: count,
                doc_ids: page.docs.iter().map(|d| d.id.clone()).collect(),
                last_seq: page.last_seq,
            },
        );
        trace!(store = %self.store_name, docs = count, "pushed batch");
        Ok(count)
    }

    /// Apply one batch of remote changes to the local store.
    async fn pull_batch(&mut self) -> SyncResult<usize> {
        let since = self.checkpoint()?.pull_seq;
        let page = self
            .with_timeout(self.remote.changes_since(since, self.options.batch_size))
            .await?;
        self.outstanding_pull = page.pending;

        if page.docs.is_empty() {
            self.advance(|c| c.pull_seq = page.last_seq)?;
            return Ok(0);
        }

        let count = page.docs.len();
        self.local.apply_replicated(&page.docs)?;
        self.advance(|c| c.pull_seq = page.last_seq)?;
        self.metrics.add_completed(&self.store_name, count as u64);
        self.metrics.publish_change(
            &self.store_name,
            ChangeSummary {
                direction: ChangeDirection::Pull,
                doc_count: count,
                doc_ids: page.docs.iter().map(|d| d.id.clone()).collect(),
                last_seq: page.last_seq,
            },
        );
        trace!(store = %self.store_name, docs = count, "pulled batch");
        Ok(count)
    }

    /// Wait out the idle interval, then heartbeat the remote.
    ///
    /// Returns `Ok(true)` if shutdown arrived during the wait. A failed or
    /// missed heartbeat is a transport error.
    async fn idle_wait(&mut self) -> SyncResult<bool> {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return Ok(true);
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.options.heartbeat_ms)) => {}
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return Ok(true);
                }
            }
        }
        if self.shutdown_requested() {
            return Ok(true);
        }
        if let Err(e) = self.verify_remote().await {
            return Err(self.fail(e));
        }
        Ok(false)
    }

    /// Metadata read with the session's network timeout applied.
    async fn verify_remote(&self) -> SyncResult<()> {
        self.with_timeout(self.remote.info()).await.map(|_| ())
    }

    async fn with_timeout<T, F>(&self, fut: F) -> SyncResult<T>
    where
        F: std::future::Future<Output = crate::remote::RemoteResult<T>>,
    {
        match tokio::time::timeout(Duration::from_millis(self.options.timeout_ms), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SyncError::transport(&self.store_name, e.to_string())),
            Err(_) => Err(SyncError::transport(
                &self.store_name,
                format!("no response within {} ms", self.options.timeout_ms),
            )),
        }
    }

    fn checkpoint(&self) -> SyncResult<SyncCheckpoint> {
        self.checkpoint
            .lock()
            .map(|c| *c)
            .map_err(|_| SyncError::CheckpointPoisoned(self.store_name.clone()))
    }

    fn advance<F: FnOnce(&mut SyncCheckpoint)>(&self, mutate: F) -> SyncResult<()> {
        let mut checkpoint = self
            .checkpoint
            .lock()
            .map_err(|_| SyncError::CheckpointPoisoned(self.store_name.clone()))?;
        mutate(&mut checkpoint);
        Ok(())
    }

    fn update_total(&self) {
        let completed = self
            .metrics
            .snapshot(&self.store_name)
            .map(|m| m.completed_docs)
            .unwrap_or(0);
        self.metrics.set_total(
            &self.store_name,
            completed + self.outstanding_push + self.outstanding_pull,
        );
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Publish a state transition, deduplicating repeats of the same state.
    fn set_state(&mut self, next: SessionState) {
        if std::mem::discriminant(&self.state) == std::mem::discriminant(&next) {
            self.state = next;
            return;
        }
        match self.state.clone().transition(next) {
            Ok(state) => {
                self.state = state;
                self.metrics
                    .publish_status(&self.store_name, self.state.as_str(), None);
            }
            Err(e) => debug!(store = %self.store_name, error = %e, "suppressed transition"),
        }
    }

    /// Error path: record, count the retry, publish, and hand the failure
    /// to the supervisor. This session instance is finished.
    fn fail(&mut self, err: SyncError) -> SyncError {
        let message = err.to_string();
        self.metrics.record_error(&self.store_name, message.clone());
        self.metrics.increment_retries(&self.store_name);
        if let Ok(state) = self.state.clone().transition(SessionState::Error {
            message: message.clone(),
        }) {
            self.state = state;
        }
        self.metrics
            .publish_status(&self.store_name, "error", Some(message));
        err
    }

    /// Explicit stop: the only path into `complete` for a live session.
    fn complete(&mut self) -> SyncResult<()> {
        if let Ok(state) = self.state.clone().transition(SessionState::Complete) {
            self.state = state;
        }
        self.metrics
            .publish_status(&self.store_name, "complete", None);
        debug!(store = %self.store_name, "session complete");
        Ok(())
    }
}
