//! # Metrics Registry
//!
//! The per-store metrics table plus subscriber fan-out. The registry is
//! owned by the orchestrator and shared by reference with every session,
//! so counters survive session restarts. Each row sits behind its own
//! mutex; concurrent sessions never contend on each other's rows.
//!
//! The registry is a pure sink: it never retries, never decides, and
//! publishing with no subscribers registered is a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use super::events::{ChangeSummary, SyncEvent};

/// One recorded session error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedError {
    /// When the error was observed
    pub at: DateTime<Utc>,
    /// Transport or protocol message
    pub message: String,
}

/// One store's metrics row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Last published session status
    pub status: String,
    /// Documents transferred, cumulative across session restarts
    pub completed_docs: u64,
    /// Documents in batches that failed mid-flight
    pub failed_docs: u64,
    /// Best known total (completed plus outstanding)
    pub total_docs: u64,
    /// Session restarts triggered by errors
    pub retries: u64,
    /// When the row was initialized
    pub started_at: DateTime<Utc>,
    /// Ordered error history
    pub errors: Vec<RecordedError>,
}

impl MetricsSnapshot {
    fn new() -> Self {
        Self {
            status: "idle".to_string(),
            completed_docs: 0,
            failed_docs: 0,
            total_docs: 0,
            retries: 0,
            started_at: Utc::now(),
            errors: Vec::new(),
        }
    }

    /// Derived completion percentage: `completed / total * 100`.
    pub fn total_progress(&self) -> f64 {
        if self.total_docs == 0 {
            0.0
        } else {
            self.completed_docs as f64 / self.total_docs as f64 * 100.0
        }
    }
}

type Row = Arc<Mutex<MetricsSnapshot>>;

/// Per-store metrics table with event fan-out.
pub struct MetricsRegistry {
    rows: RwLock<HashMap<String, Row>>,
    subscribers: RwLock<Vec<mpsc::UnboundedSender<SyncEvent>>>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer. Every published event is delivered to every
    /// live subscriber; dropped receivers are pruned on the next publish.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push(tx);
        }
        rx
    }

    fn publish(&self, event: SyncEvent) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Initialize (or reset to an existing) row for a store.
    ///
    /// Idempotent: a row that already exists keeps its counters, which is
    /// what makes `completedDocs` monotonic across session restarts.
    pub fn init_store(&self, store: &str) {
        let mut created = false;
        if let Ok(mut rows) = self.rows.write() {
            rows.entry(store.to_string()).or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(MetricsSnapshot::new()))
            });
        }
        if created {
            self.publish_metrics(store);
        }
    }

    fn row(&self, store: &str) -> Option<Row> {
        self.rows.read().ok().and_then(|rows| rows.get(store).cloned())
    }

    /// Mutate one row under its own lock, then publish `sync:metrics`.
    fn record<F: FnOnce(&mut MetricsSnapshot)>(&self, store: &str, mutate: F) {
        let Some(row) = self.row(store) else { return };
        if let Ok(mut metrics) = row.lock() {
            mutate(&mut metrics);
        }
        self.publish_metrics(store);
    }

    /// Current row for a store.
    pub fn snapshot(&self, store: &str) -> Option<MetricsSnapshot> {
        let row = self.row(store)?;
        row.lock().ok().map(|m| m.clone())
    }

    /// Add transferred documents to the cumulative counter.
    pub fn add_completed(&self, store: &str, docs: u64) {
        self.record(store, |m| m.completed_docs += docs);
    }

    /// Add documents from a batch that failed mid-flight.
    pub fn add_failed(&self, store: &str, docs: u64) {
        self.record(store, |m| m.failed_docs += docs);
    }

    /// Update the best known total. Never shrinks below `completed_docs`.
    pub fn set_total(&self, store: &str, total: u64) {
        self.record(store, |m| m.total_docs = total.max(m.completed_docs));
    }

    /// Bump the restart counter.
    pub fn increment_retries(&self, store: &str) {
        self.record(store, |m| m.retries += 1);
    }

    /// Append to the ordered error history.
    pub fn record_error(&self, store: &str, message: impl Into<String>) {
        let message = message.into();
        self.record(store, |m| {
            m.errors.push(RecordedError {
                at: Utc::now(),
                message,
            })
        });
    }

    /// Publish a `sync:status` transition, snapshotting the row into it.
    pub fn publish_status(&self, store: &str, status: &str, error: Option<String>) {
        if let Some(row) = self.row(store) {
            if let Ok(mut metrics) = row.lock() {
                metrics.status = status.to_string();
            }
        }
        self.publish(SyncEvent::Status {
            store: store.to_string(),
            status: status.to_string(),
            error,
            metrics: self.snapshot(store),
        });
    }

    /// Publish a `sync:change` batch event.
    pub fn publish_change(&self, store: &str, change: ChangeSummary) {
        self.publish(SyncEvent::Change {
            store: store.to_string(),
            change,
        });
    }

    fn publish_metrics(&self, store: &str) {
        let Some(metrics) = self.snapshot(store) else { return };
        let total_progress = metrics.total_progress();
        self.publish(SyncEvent::Metrics {
            store: store.to_string(),
            metrics,
            total_progress,
        });
    }
}
