//! CLI argument definitions using clap
//!
//! Commands:
//! - tillsync init --config <path>
//! - tillsync start --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// TillSync - local-first document sync engine for restaurant operations
#[derive(Parser, Debug)]
#[command(name = "tillsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a starter configuration and create the data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./tillsync.json")]
        config: PathBuf,
    },

    /// Provision stores, start replication, and run until ctrl-c
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./tillsync.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
