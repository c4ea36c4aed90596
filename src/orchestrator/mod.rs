//! Sync Orchestrator
//!
//! Drives the whole startup sequence: provisions every local store before
//! any replication starts, then wires one supervised session per store
//! with a configured remote. Partial success is a supported terminal
//! state: stores that fail setup are recorded and skipped while the rest
//! keep replicating.
//!
//! Failure policy:
//! - local provisioning failure is fatal and propagated
//! - remote-side failures are isolated per store
//! - an unmapped store is skipped with a warning and counted as failed

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::metrics::MetricsRegistry;
use crate::remote::RemoteBackend;
use crate::store::{ProvisionError, StoreProvisioner};
use crate::sync::{self, SessionHandle};

/// Owns the provisioner, the metrics registry, and every session handle.
pub struct SyncOrchestrator {
    config: SyncConfig,
    backend: Arc<dyn RemoteBackend>,
    provisioner: StoreProvisioner,
    registry: Arc<MetricsRegistry>,
    sessions: Mutex<Vec<SessionHandle>>,
    failed: Mutex<BTreeMap<String, String>>,
}

impl SyncOrchestrator {
    /// Build an orchestrator for a validated configuration.
    pub fn new(config: SyncConfig, backend: Arc<dyn RemoteBackend>) -> Self {
        let provisioner = StoreProvisioner::new(config.data_dir.clone());
        Self {
            config,
            backend,
            provisioner,
            registry: Arc::new(MetricsRegistry::new()),
            sessions: Mutex::new(Vec::new()),
            failed: Mutex::new(BTreeMap::new()),
        }
    }

    /// Shared metrics registry; subscribe here for sync events.
    pub fn registry(&self) -> Arc<MetricsRegistry> {
        self.registry.clone()
    }

    /// The local store handle map, for collaborating subsystems.
    pub fn provisioner(&self) -> &StoreProvisioner {
        &self.provisioner
    }

    /// Stores that failed setup, with the reason recorded for each.
    pub fn failed_stores(&self) -> BTreeMap<String, String> {
        self.failed
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    fn mark_failed(&self, store: &str, reason: String) {
        if let Ok(mut failed) = self.failed.lock() {
            failed.insert(store.to_string(), reason);
        }
    }

    /// Provision every store, then start replication for each store with a
    /// configured remote.
    ///
    /// Returns `Ok(true)` only if every configured-with-remote store came
    /// up; `Ok(false)` on partial failure, leaving succeeded stores fully
    /// operational. A local provisioning failure aborts the whole startup.
    pub async fn setup_all(&self) -> Result<bool, ProvisionError> {
        // All stores are provisioned before any replication starts.
        for store_config in &self.config.stores {
            self.provisioner
                .open(&store_config.name, &store_config.index_specs())
                .await?;
        }

        let mut all_ok = true;
        for store_config in &self.config.stores {
            let name = store_config.name.as_str();

            let url = match self.config.remote_url_for(name) {
                Ok(url) => url,
                Err(e) => {
                    warn!(store = name, "no remote mapped, store is local-only");
                    self.mark_failed(name, e.to_string());
                    all_ok = false;
                    continue;
                }
            };

            let Some(local) = self.provisioner.get(name) else {
                self.mark_failed(name, "store handle missing after provisioning".into());
                all_ok = false;
                continue;
            };
            // Local health verification before touching the remote.
            if let Err(e) = local.probe() {
                warn!(store = name, error = %e, "local health check failed");
                self.mark_failed(name, e.to_string());
                all_ok = false;
                continue;
            }

            self.registry.init_store(name);
            self.registry.publish_status(name, "initializing", None);

            if let Err(e) = self.backend.ensure(&url).await {
                warn!(store = name, error = %e, "remote setup failed");
                self.registry.record_error(name, e.to_string());
                self.registry.publish_status(name, "error", Some(e.to_string()));
                self.mark_failed(name, e.to_string());
                all_ok = false;
                continue;
            }

            let remote = self.backend.open(&url);
            let handle = sync::spawn(
                name,
                local,
                remote,
                self.config.session.clone(),
                self.registry.clone(),
            );
            if let Ok(mut sessions) = self.sessions.lock() {
                sessions.push(handle);
            }
            info!(store = name, url, "replication session started");
        }

        Ok(all_ok)
    }

    /// Cancel every live session (including pending restart timers) and
    /// close every local store handle. Individual close failures are
    /// logged, never propagated.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self
            .sessions
            .lock()
            .map(|mut sessions| sessions.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            handle.stop().await;
        }
        self.provisioner.close_all();
        info!("sync engine stopped");
    }
}
