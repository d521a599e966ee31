//! Options of one rollback run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::wait::WaitConfig;
use crate::cluster::LivenessPolicy;
use crate::verify::VerifierOptions;

fn default_name() -> String {
    "rollback_test".to_string()
}

fn default_wait_interval_ms() -> u64 {
    200
}

fn default_wait_timeout_ms() -> u64 {
    10 * 60 * 1000
}

/// Options for `RollbackTest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackTestOptions {
    /// Run name; tags every log line
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,

    /// Deadline of every bounded wait
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,

    /// Deadline of the wait for the rollback node to finish rollback.
    /// Falls back to `wait_timeout_ms`.
    #[serde(default)]
    pub await_secondary_timeout_ms: Option<u64>,

    /// Whether members may be restarted mid-run
    #[serde(default)]
    pub rollback_shutdowns: bool,

    /// Whether restarts may use SIGKILL
    #[serde(default)]
    pub allow_unclean_shutdowns: bool,

    #[serde(default)]
    pub liveness_policy: LivenessPolicy,
}

impl Default for RollbackTestOptions {
    fn default() -> Self {
        Self {
            name: default_name(),
            wait_interval_ms: default_wait_interval_ms(),
            wait_timeout_ms: default_wait_timeout_ms(),
            await_secondary_timeout_ms: None,
            rollback_shutdowns: false,
            allow_unclean_shutdowns: false,
            liveness_policy: LivenessPolicy::default(),
        }
    }
}

impl RollbackTestOptions {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_wait(mut self, interval_ms: u64, timeout_ms: u64) -> Self {
        self.wait_interval_ms = interval_ms;
        self.wait_timeout_ms = timeout_ms;
        self
    }

    pub fn with_rollback_shutdowns(mut self, allow_unclean: bool) -> Self {
        self.rollback_shutdowns = true;
        self.allow_unclean_shutdowns = allow_unclean;
        self
    }

    pub fn with_liveness_policy(mut self, policy: LivenessPolicy) -> Self {
        self.liveness_policy = policy;
        self
    }

    pub fn wait(&self) -> WaitConfig {
        WaitConfig::from_millis(self.wait_interval_ms, self.wait_timeout_ms)
    }

    /// Wait used for the rollback node in `return_to_steady_state`.
    pub fn rollback_wait(&self) -> WaitConfig {
        let timeout = self.await_secondary_timeout_ms.unwrap_or(self.wait_timeout_ms);
        self.wait().with_timeout(Duration::from_millis(timeout))
    }

    pub fn verifier(&self) -> VerifierOptions {
        VerifierOptions {
            allow_unclean_shutdowns: self.allow_unclean_shutdowns,
            rollback_shutdowns: self.rollback_shutdowns,
            wait: self.wait(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let options: RollbackTestOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, RollbackTestOptions::default());
        assert_eq!(options.wait().timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_rollback_wait_override() {
        let mut options = RollbackTestOptions::named("t").with_wait(5, 1000);
        assert_eq!(options.rollback_wait().timeout, Duration::from_millis(1000));
        options.await_secondary_timeout_ms = Some(50);
        assert_eq!(options.rollback_wait().timeout, Duration::from_millis(50));
        assert_eq!(options.rollback_wait().interval, Duration::from_millis(5));
    }

    #[test]
    fn test_verifier_options_follow_shutdown_flags() {
        let options = RollbackTestOptions::default().with_rollback_shutdowns(true);
        let verifier = options.verifier();
        assert!(verifier.rollback_shutdowns);
        assert!(verifier.allow_unclean_shutdowns);
    }
}
