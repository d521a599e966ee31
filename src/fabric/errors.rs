//! Connectivity fabric errors.
//!
//! Any of these leaves the topology in a state the scenario did not ask
//! for, so callers treat them as fatal.

use thiserror::Error;

use crate::node::NodeId;

/// Result type for link operations
pub type FabricResult<T> = Result<T, FabricError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FabricError {
    /// Node is not part of the fabric
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A node cannot be partitioned from itself
    #[error("cannot change the link from {0} to itself")]
    SelfLink(NodeId),

    /// The underlying bridge refused or failed the operation
    #[error("bridge failure between {a} and {b}: {reason}")]
    Bridge { a: NodeId, b: NodeId, reason: String },
}
