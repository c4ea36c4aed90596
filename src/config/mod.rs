//! Configuration Subsystem
//!
//! One JSON file describes the whole sync engine: the data directory, the
//! central server (base URL plus credential pair), the logical stores with
//! their secondary index specs, the explicit store-to-remote mapping
//! table, and the session options.
//!
//! The mapping table is validated, never inferred: a store without an
//! entry is a typed `UnmappedStore` error, not a silently-derived URL.

mod errors;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::remote::RemoteCredentials;
use crate::store::IndexSpec;
use crate::sync::SessionOptions;

pub use errors::{ConfigError, ConfigResult};

/// Central server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the remote server, without a trailing slash
    pub base_url: String,
    /// Basic auth user
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// Explicit mapping table: logical store name -> remote database name
    /// (or a full URL for stores replicated elsewhere)
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

/// One logical store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Logical store name ("orders", "inventory", ...)
    pub name: String,
    /// Secondary index field-sets
    #[serde(default)]
    pub indexes: Vec<Vec<String>>,
}

impl StoreConfig {
    /// Index specs for the provisioner.
    pub fn index_specs(&self) -> Vec<IndexSpec> {
        self.indexes
            .iter()
            .map(|fields| IndexSpec::new(fields.iter().cloned()))
            .collect()
    }
}

/// Complete sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root directory holding one subdirectory per store
    pub data_dir: PathBuf,
    /// Central server; absent means every store is local-only
    #[serde(default)]
    pub remote: Option<RemoteSettings>,
    /// Logical store set
    pub stores: Vec<StoreConfig>,
    /// Replication session options
    #[serde(default)]
    pub session: SessionOptions,
}

impl SyncConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: SyncConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation beyond the JSON shape.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.stores.is_empty() {
            return Err(ConfigError::Invalid("no stores configured".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for store in &self.stores {
            if store.name.is_empty() {
                return Err(ConfigError::Invalid("store with empty name".into()));
            }
            if !seen.insert(&store.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate store name '{}'",
                    store.name
                )));
            }
        }
        if let Some(remote) = &self.remote {
            reqwest::Url::parse(&remote.base_url).map_err(|e| {
                ConfigError::Invalid(format!("bad remote base_url '{}': {e}", remote.base_url))
            })?;
            for target in remote.targets.keys() {
                if !self.stores.iter().any(|s| &s.name == target) {
                    return Err(ConfigError::Invalid(format!(
                        "remote target for unknown store '{target}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolve the remote endpoint for a store through the mapping table.
    pub fn remote_url_for(&self, store: &str) -> ConfigResult<String> {
        let remote = self.remote.as_ref().ok_or_else(|| ConfigError::UnmappedStore {
            store: store.to_string(),
        })?;
        let target = remote
            .targets
            .get(store)
            .ok_or_else(|| ConfigError::UnmappedStore {
                store: store.to_string(),
            })?;
        if target.contains("://") {
            return Ok(target.clone());
        }
        Ok(format!(
            "{}/{}",
            remote.base_url.trim_end_matches('/'),
            target
        ))
    }

    /// Credential pair for the remote server, when configured.
    pub fn credentials(&self) -> Option<RemoteCredentials> {
        self.remote.as_ref().map(|r| RemoteCredentials {
            username: r.username.clone(),
            password: r.password.clone(),
        })
    }

    /// Starter configuration written by `tillsync init`.
    pub fn example() -> Self {
        let stores = ["menu", "inventory", "orders", "kitchen", "loyalty"];
        Self {
            data_dir: PathBuf::from("./data"),
            remote: Some(RemoteSettings {
                base_url: "https://sync.example.com".into(),
                username: "site".into(),
                password: "change-me".into(),
                targets: stores
                    .iter()
                    .map(|s| (s.to_string(), s.to_string()))
                    .collect(),
            }),
            stores: stores
                .iter()
                .map(|s| StoreConfig {
                    name: s.to_string(),
                    indexes: Vec::new(),
                })
                .collect(),
            session: SessionOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_targets(targets: &[(&str, &str)]) -> SyncConfig {
        SyncConfig {
            data_dir: PathBuf::from("/tmp/till"),
            remote: Some(RemoteSettings {
                base_url: "https://sync.example.com/".into(),
                username: "u".into(),
                password: "p".into(),
                targets: targets
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
            stores: targets
                .iter()
                .map(|(k, _)| StoreConfig {
                    name: k.to_string(),
                    indexes: Vec::new(),
                })
                .collect(),
            session: SessionOptions::default(),
        }
    }

    #[test]
    fn test_mapping_table_resolves_and_trims_slash() {
        let config = config_with_targets(&[("orders", "site1_orders")]);
        assert_eq!(
            config.remote_url_for("orders").unwrap(),
            "https://sync.example.com/site1_orders"
        );
    }

    #[test]
    fn test_full_url_target_passes_through() {
        let config = config_with_targets(&[("orders", "https://other.example.com/orders")]);
        assert_eq!(
            config.remote_url_for("orders").unwrap(),
            "https://other.example.com/orders"
        );
    }

    #[test]
    fn test_unmapped_store_is_typed_error() {
        let mut config = config_with_targets(&[("orders", "orders")]);
        config.stores.push(StoreConfig {
            name: "loyalty".into(),
            indexes: Vec::new(),
        });
        assert!(matches!(
            config.remote_url_for("loyalty"),
            Err(ConfigError::UnmappedStore { store }) if store == "loyalty"
        ));
    }

    #[test]
    fn test_no_remote_section_means_unmapped() {
        let mut config = config_with_targets(&[("orders", "orders")]);
        config.remote = None;
        assert!(matches!(
            config.remote_url_for("orders"),
            Err(ConfigError::UnmappedStore { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_unknown_targets() {
        let mut config = config_with_targets(&[("orders", "orders")]);
        config.stores.push(StoreConfig {
            name: "orders".into(),
            indexes: Vec::new(),
        });
        assert!(config.validate().is_err());

        let mut config = config_with_targets(&[("orders", "orders")]);
        if let Some(remote) = &mut config.remote {
            remote.targets.insert("ghost".into(), "ghost".into());
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_round_trips() {
        let example = SyncConfig::example();
        example.validate().unwrap();
        let json = serde_json::to_string_pretty(&example).unwrap();
        let parsed: SyncConfig = serde_json::from_str(&json).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.stores.len(), 5);
    }
}
