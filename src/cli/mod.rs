//! CLI module for TillSync
//!
//! Provides the command-line interface:
//! - init: write a starter configuration and create the data directory
//! - start: boot the sync engine and serve until interrupted

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{init, run_command, start};
pub use errors::{CliError, CliResult};

/// Parse arguments and run the selected command.
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args())
}
