//! CLI command implementations
//!
//! `start` owns process lifecycle: tracing init, runtime construction,
//! orchestrator startup, the event drain, and shutdown on ctrl-c.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::SyncConfig;
use crate::orchestrator::SyncOrchestrator;
use crate::remote::{HttpRemoteBackend, MemoryRemoteBackend, RemoteBackend};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Dispatch a parsed command line.
pub fn run_command(cli: Cli) -> CliResult<()> {
    match cli.command {
        Command::Init { config } => init(&config),
        Command::Start { config } => start(&config),
    }
}

/// Write a starter configuration file and create its data directory.
pub fn init(config_path: &Path) -> CliResult<()> {
    if config_path.exists() {
        return Err(CliError::Runtime(format!(
            "refusing to overwrite existing {}",
            config_path.display()
        )));
    }
    let example = SyncConfig::example();
    let json = serde_json::to_string_pretty(&example)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    fs::write(config_path, json)?;
    fs::create_dir_all(&example.data_dir)?;
    println!("wrote {}", config_path.display());
    Ok(())
}

/// Boot the sync engine and serve until interrupted.
pub fn start(config_path: &Path) -> CliResult<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let config = SyncConfig::load(config_path)?;

    let backend: Arc<dyn RemoteBackend> = match config.credentials() {
        Some(credentials) => Arc::new(
            HttpRemoteBackend::new(credentials, Duration::from_millis(config.session.timeout_ms))
                .map_err(|e| CliError::Runtime(e.to_string()))?,
        ),
        None => {
            warn!("no remote configured, running against an in-process backend");
            Arc::new(MemoryRemoteBackend::new())
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let orchestrator = SyncOrchestrator::new(config, backend);

        // Drain published events into the structured log.
        let mut events = orchestrator.registry().subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Ok(json) = serde_json::to_string(&event) {
                    info!(target: "tillsync::events", "{json}");
                }
            }
        });

        let all_ok = orchestrator.setup_all().await?;
        if all_ok {
            info!("all stores replicating");
        } else {
            for (store, reason) in orchestrator.failed_stores() {
                warn!(store, reason, "store did not come up");
            }
        }

        tokio::signal::ctrl_c().await?;
        info!("interrupt received, shutting down");
        orchestrator.shutdown().await;
        Ok(())
    })
}
