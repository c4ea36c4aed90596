//! # Session Supervisor
//!
//! Owns the lifecycle of one store's replication: spawns a session,
//! and when the session fails, waits out the restart delay and spawns a
//! fresh one. The errored instance is always cancelled first, so at most
//! one live session exists per store at any instant.
//!
//! The restart delay is cancellable: a shutdown signal during the delay
//! clears the pending restart instead of reviving a session after
//! teardown. The restart ceiling is injectable policy; the platform
//! default is unbounded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::MetricsRegistry;
use crate::remote::RemoteStore;
use crate::store::LocalStore;

use super::options::SessionOptions;
use super::session::{ReplicationSession, SyncCheckpoint};

/// Handle to one store's supervised replication.
pub struct SessionHandle {
    store_name: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Logical store this handle supervises.
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Signal shutdown without waiting for the task to finish.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether the supervising task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the session (or its pending restart
    /// timer) to wind down.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(store = %self.store_name, error = %e, "session task aborted");
        }
    }
}

/// Spawn the supervised replication loop for one store.
pub fn spawn(
    store_name: impl Into<String>,
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    options: SessionOptions,
    metrics: Arc<MetricsRegistry>,
) -> SessionHandle {
    let store_name = store_name.into();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(supervise(
        store_name.clone(),
        local,
        remote,
        options,
        metrics,
        shutdown_rx,
    ));
    SessionHandle {
        store_name,
        shutdown: shutdown_tx,
        task,
    }
}

async fn supervise(
    store_name: String,
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    options: SessionOptions,
    metrics: Arc<MetricsRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Checkpoints outlive each session so replacements resume, not resend.
    let checkpoint = Arc::new(Mutex::new(SyncCheckpoint::default()));
    let mut restarts: u64 = 0;

    loop {
        let session = ReplicationSession::new(
            store_name.clone(),
            local.clone(),
            remote.clone(),
            options.clone(),
            metrics.clone(),
            checkpoint.clone(),
            shutdown.clone(),
        );

        match session.run().await {
            Ok(()) => {
                debug!(store = %store_name, "session finished");
                return;
            }
            Err(err) => {
                // The session already recorded and published the failure.
                warn!(store = %store_name, error = %err, "session failed");
                if !options.retry {
                    return;
                }
                restarts += 1;
                if let Some(ceiling) = options.max_restarts {
                    if restarts > u64::from(ceiling) {
                        warn!(
                            store = %store_name,
                            restarts,
                            "restart ceiling reached, store stays offline"
                        );
                        return;
                    }
                }
            }
        }

        if *shutdown.borrow() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(options.restart_delay_ms)) => {}
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    debug!(store = %store_name, "pending restart cancelled by shutdown");
                    return;
                }
            }
        }
        if *shutdown.borrow() {
            return;
        }
        debug!(store = %store_name, restarts, "starting replacement session");
    }
}
