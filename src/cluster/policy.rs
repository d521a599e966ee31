//! Refetch-rollback liveness policy.
//!
//! Members that cannot serve majority reads, or run an in-memory engine,
//! roll back by refetching documents. That algorithm only finishes once
//! the sync source's applied optime reaches the rollback node's old top
//! of oplog, so the harness must push the new primary past it before
//! reconnecting. Whether that applies is storage-engine specific and is
//! decided here rather than in the phase machine.

use serde::{Deserialize, Serialize};

use crate::node::ServerStatus;

/// Engine name of the in-memory storage engine.
pub const IN_MEMORY_ENGINE: &str = "inMemory";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessPolicy {
    /// Decide from the rollback node's `serverStatus`
    #[default]
    Auto,
    /// Always wait for the primary's applied optime
    Always,
    /// Never wait
    Never,
}

impl LivenessPolicy {
    /// Whether the primary must surpass the rollback node's applied optime.
    pub fn requires_applied_wait(&self, rollback_node: &ServerStatus) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                !rollback_node.supports_committed_reads
                    || rollback_node.storage_engine == IN_MEMORY_ENGINE
            }
        }
    }
}
