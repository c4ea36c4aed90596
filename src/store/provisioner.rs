//! # Store Provisioner
//!
//! Opens or creates every named local store, applies its secondary index
//! specs, and health-probes it before replication is allowed to start.
//! The probe is retried a bounded number of times with linear backoff
//! (3 attempts, 1 s step); exhausting the attempts is fatal to startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use super::errors::{ProvisionError, ProvisionResult, StoreError, StoreResult};
use super::index::IndexSpec;
use super::local::{LocalStore, StoreInfo};

/// Probe attempts before a store is declared unusable.
pub const PROBE_ATTEMPTS: u32 = 3;

/// Linear backoff step between probe attempts.
pub const PROBE_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Provisions local stores and owns the handle map keyed by logical name.
pub struct StoreProvisioner {
    data_dir: PathBuf,
    handles: RwLock<HashMap<String, Arc<LocalStore>>>,
}

impl StoreProvisioner {
    /// Create a provisioner rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Root directory holding one subdirectory per store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Open or create a store, apply its index specs, and probe it.
    ///
    /// Idempotent per name: a second call returns the existing handle after
    /// re-applying the (idempotent) index specs.
    pub async fn open(&self, name: &str, index_specs: &[IndexSpec]) -> ProvisionResult<Arc<LocalStore>> {
        if let Some(existing) = self.get(name) {
            for spec in index_specs {
                existing
                    .ensure_index(spec)
                    .map_err(|e| self.fatal(name, 1, e))?;
            }
            return Ok(existing);
        }

        let store = LocalStore::open(&self.data_dir, name).map_err(|e| self.fatal(name, 1, e))?;
        for spec in index_specs {
            store.ensure_index(spec).map_err(|e| self.fatal(name, 1, e))?;
        }

        let info = self.probe_with_backoff(&store).await.map_err(|e| ProvisionError {
            store: name.to_string(),
            attempts: PROBE_ATTEMPTS,
            source: e,
        })?;
        debug!(
            store = name,
            docs = info.doc_count,
            update_seq = info.update_seq,
            "store provisioned"
        );

        let handle = Arc::new(store);
        if let Ok(mut handles) = self.handles.write() {
            handles.insert(name.to_string(), handle.clone());
        }
        Ok(handle)
    }

    /// Probe with linear backoff: attempt N waits N * step before retrying.
    async fn probe_with_backoff(&self, store: &LocalStore) -> StoreResult<StoreInfo> {
        let mut last_err = None;
        for attempt in 1..=PROBE_ATTEMPTS {
            match store.probe() {
                Ok(info) => return Ok(info),
                Err(e) => {
                    warn!(
                        store = store.name(),
                        attempt,
                        error = %e,
                        "store health probe failed"
                    );
                    last_err = Some(e);
                    if attempt < PROBE_ATTEMPTS {
                        tokio::time::sleep(PROBE_BACKOFF_STEP * attempt).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(StoreError::LockPoisoned))
    }

    fn fatal(&self, name: &str, attempts: u32, source: StoreError) -> ProvisionError {
        ProvisionError {
            store: name.to_string(),
            attempts,
            source,
        }
    }

    /// Handle for an already-provisioned store.
    pub fn get(&self, name: &str) -> Option<Arc<LocalStore>> {
        self.handles
            .read()
            .ok()
            .and_then(|handles| handles.get(name).cloned())
    }

    /// Names of every provisioned store.
    pub fn store_names(&self) -> Vec<String> {
        self.handles
            .read()
            .map(|handles| handles.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Close every handle, logging individual failures without aborting.
    pub fn close_all(&self) {
        let drained: Vec<(String, Arc<LocalStore>)> = match self.handles.write() {
            Ok(mut handles) => handles.drain().collect(),
            Err(_) => {
                warn!("store handle map lock poisoned during shutdown");
                return;
            }
        };
        for (name, store) in drained {
            if let Err(e) = store.close() {
                warn!(store = %name, error = %e, "failed to close store");
            } else {
                debug!(store = %name, "store closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_provisions_store_and_indexes() {
        let dir = TempDir::new().unwrap();
        let provisioner = StoreProvisioner::new(dir.path());

        let specs = vec![IndexSpec::new(["status"]), IndexSpec::new(["table", "status"])];
        let store = provisioner.open("orders", &specs).await.unwrap();
        assert_eq!(
            store.index_names().unwrap(),
            vec!["status".to_string(), "table+status".to_string()]
        );
        assert!(dir.path().join("orders/documents.dat").exists());
    }

    #[tokio::test]
    async fn test_open_twice_returns_same_handle() {
        let dir = TempDir::new().unwrap();
        let provisioner = StoreProvisioner::new(dir.path());

        let first = provisioner.open("inventory", &[]).await.unwrap();
        let second = provisioner.open("inventory", &[]).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provisioner.store_names(), vec!["inventory".to_string()]);
    }

    #[tokio::test]
    async fn test_close_all_drains_handles() {
        let dir = TempDir::new().unwrap();
        let provisioner = StoreProvisioner::new(dir.path());
        provisioner.open("orders", &[]).await.unwrap();
        provisioner.open("menu", &[]).await.unwrap();

        provisioner.close_all();
        assert!(provisioner.store_names().is_empty());
        assert!(provisioner.get("orders").is_none());
    }
}
