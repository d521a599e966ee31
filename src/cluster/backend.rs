//! Process-level control of the members behind a replica set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::config::ReplSetConfig;
use crate::fabric::ConnectivityFabric;
use crate::harness::HarnessResult;
use crate::node::{NodeConnection, NodeId};

/// How a member is shut down before a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownSignal {
    /// Clean shutdown (SIGTERM)
    Term,
    /// Unclean shutdown (SIGKILL)
    Kill,
}

impl ShutdownSignal {
    pub fn number(&self) -> i32 {
        match self {
            Self::Term => 15,
            Self::Kill => 9,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Term)
    }
}

/// Whatever started the members: real processes or an in-memory model.
pub trait ClusterBackend: Send + Sync {
    /// Config the set was initiated with.
    fn config(&self) -> ReplSetConfig;

    /// Open a command connection to a member.
    fn connect(&self, id: NodeId) -> HarnessResult<Arc<dyn NodeConnection>>;

    /// Partition control, if the members run behind a bridge.
    fn fabric(&self) -> Option<Arc<dyn ConnectivityFabric>>;

    /// Stop a member with `signal` and start it again with the same data.
    fn restart(&self, id: NodeId, signal: ShutdownSignal) -> HarnessResult<()>;

    /// Stop every member.
    fn stop_all(&self) -> HarnessResult<()>;
}
