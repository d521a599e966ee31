//! CLI argument definitions using clap
//!
//! Commands:
//! - rollback-harness run [--config <path>] [--cycles <n>]
//! - rollback-harness check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Drive replica set rollback scenarios and check the members converge
#[derive(Parser, Debug)]
#[command(name = "rollback-harness")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run rollback cycles against an in-memory replica set
    Run {
        /// Path to configuration file; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of rollback cycles, overriding the config file
        #[arg(long)]
        cycles: Option<u32>,
    },

    /// Validate a configuration file and exit
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./rollback.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
