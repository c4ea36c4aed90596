//! # Configuration Errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid JSON for the expected shape
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// No remote URL mapped for a logical store.
    ///
    /// Non-fatal: the store stays valid for local use, is skipped by
    /// replication with a warning, and is counted as failed in the
    /// aggregate result.
    #[error("no remote target mapped for store '{store}'")]
    UnmappedStore {
        /// Logical store name
        store: String,
    },

    /// Semantic validation failure
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
