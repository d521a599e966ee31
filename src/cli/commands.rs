//! CLI command implementations
//!
//! `run` drives full rollback cycles against an in-memory replica set and
//! prints a JSON summary. `check-config` only loads and validates.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cluster::{ReplSetConfig, ReplicaSet};
use crate::harness::{RollbackTest, RollbackTestOptions};
use crate::node::Namespace;
use crate::observability::{log_event, Event};
use crate::sim::{SimCluster, StorageProfile};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Replica set config; the standard three-member set when absent
    #[serde(default)]
    pub replset: Option<ReplSetConfig>,

    #[serde(default)]
    pub options: RollbackTestOptions,

    #[serde(default)]
    pub storage: StorageProfile,

    /// Rollback cycles per run (default 1)
    #[serde(default = "default_cycles")]
    pub cycles: u32,
}

fn default_cycles() -> u32 {
    1
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            replset: None,
            options: RollbackTestOptions::default(),
            storage: StorageProfile::default(),
            cycles: default_cycles(),
        }
    }
}

impl RunConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: RunConfig = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.cycles == 0 {
            return Err(CliError::config_error("cycles must be > 0"));
        }
        if self.options.wait_interval_ms == 0 {
            return Err(CliError::config_error("options.wait_interval_ms must be > 0"));
        }
        if self.options.wait_timeout_ms < self.options.wait_interval_ms {
            return Err(CliError::config_error(
                "options.wait_timeout_ms must be >= options.wait_interval_ms",
            ));
        }
        if let Some(replset) = &self.replset {
            replset
                .validate()
                .map_err(|e| CliError::config_error(e.message))?;
        }
        Ok(())
    }

    fn replset_name(&self) -> &str {
        self.replset
            .as_ref()
            .map(|r| r.name.as_str())
            .unwrap_or(self.options.name.as_str())
    }
}

/// Outcome of one rollback cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle: u32,
    /// Member whose writes were rolled back
    pub rollback_node: String,
    pub new_primary: String,
    pub rbid_before: i64,
    pub rbid_after: i64,
    /// Documents left in the cycle collection on the primary
    pub documents: u64,
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Run { config, cycles } => run_cycles(config.as_deref(), cycles),
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn load_or_default(config_path: Option<&Path>) -> CliResult<RunConfig> {
    match config_path {
        Some(path) => RunConfig::load(path),
        None => Ok(RunConfig::default()),
    }
}

/// Validate a configuration file
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = RunConfig::load(config_path)?;
    write_response(json!({
        "valid": true,
        "name": config.options.name,
        "replset": config.replset_name(),
        "cycles": config.cycles,
    }))
}

/// Run rollback cycles and print a summary
pub fn run_cycles(config_path: Option<&Path>, cycles: Option<u32>) -> CliResult<()> {
    let mut config = load_or_default(config_path)?;
    if let Some(cycles) = cycles {
        config.cycles = cycles;
    }
    config.validate()?;

    let summary = execute(&config)?;
    write_response(summary)
}

/// Run every configured cycle and stop the set.
pub fn execute(config: &RunConfig) -> CliResult<serde_json::Value> {
    let name = config.options.name.clone();
    let cycles_text = config.cycles.to_string();
    log_event(
        &name,
        Event::ConfigLoaded,
        &[("replset", config.replset_name()), ("cycles", &cycles_text)],
    );

    let mut builder = SimCluster::builder(config.replset_name()).with_storage(config.storage.clone());
    if let Some(replset) = &config.replset {
        builder = builder.with_config(replset.clone());
    }
    let rs = ReplicaSet::adopt(Arc::new(builder.build()))?
        .with_liveness_policy(config.options.liveness_policy);
    let mut rt = RollbackTest::with_replica_set(rs, config.options.clone())?;

    let started_at = Utc::now();
    log_event(&name, Event::RunBegin, &[("cycles", &cycles_text)]);

    let mut summaries = Vec::with_capacity(config.cycles as usize);
    for cycle in 1..=config.cycles {
        summaries.push(run_cycle(&mut rt, cycle)?);
    }
    rt.stop()?;

    let finished_at = Utc::now();
    let elapsed_ms = (finished_at - started_at).num_milliseconds().to_string();
    log_event(&name, Event::RunComplete, &[("elapsed_ms", &elapsed_ms)]);

    Ok(json!({
        "name": name,
        "started_at": started_at.to_rfc3339(),
        "finished_at": finished_at.to_rfc3339(),
        "phase": rt.phase().name(),
        "cycles": summaries,
    }))
}

/// One full cycle with a write in every phase that accepts writes.
fn run_cycle(rt: &mut RollbackTest, cycle: u32) -> CliResult<CycleSummary> {
    let ns = Namespace::new("test", "rollback_cycles");

    let doomed = rt.enter_rollback_ops()?;
    doomed.insert_one(&ns, json!({"cycle": cycle, "phase": "rollback_ops"}))?;

    let sync_source = rt.enter_sync_source_ops_before_rollback()?;
    sync_source.insert_one(&ns, json!({"cycle": cycle, "phase": "before_rollback"}))?;
    let rbid_before = rt
        .last_rbid()
        .ok_or_else(|| CliError::run_failed("no rbid captured"))?;

    let primary = rt.enter_sync_source_ops_during_rollback()?;
    primary.insert_one(&ns, json!({"cycle": cycle, "phase": "during_rollback"}))?;

    let primary = rt.return_to_steady_state()?;
    let rbid_after = rt.secondary().conn().repl_set_get_rbid()?;
    primary.insert_one(&ns, json!({"cycle": cycle, "phase": "steady_state"}))?;

    Ok(CycleSummary {
        cycle,
        rollback_node: doomed.host().to_string(),
        new_primary: primary.host().to_string(),
        rbid_before,
        rbid_after,
        documents: primary.conn().count(&ns)?,
    })
}
