//! CLI module for rollback-harness
//!
//! Provides command-line interface for:
//! - run: Drive rollback cycles against an in-memory replica set
//! - check-config: Validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, execute, run, run_command, run_cycles, CycleSummary, RunConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_response;
