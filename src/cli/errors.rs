//! CLI error types

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::ProvisionError;

/// Result type for CLI commands
pub type CliResult<T> = Result<T, CliError>;

/// CLI errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or validated
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Local store provisioning failed at startup
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Filesystem failure outside the store engine
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else that should stop the process
    #[error("{0}")]
    Runtime(String),
}
