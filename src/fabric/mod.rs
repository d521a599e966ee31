//! Connectivity Fabric
//!
//! Pairwise reachability between members, the way a bridge in front of
//! each server exposes it. Links are symmetric and binary: fully up or
//! fully down, no delay or loss modelling.
//!
//! Only the rollback controller mutates the fabric. A failed mutation is
//! fatal to the scenario.

mod errors;
mod links;

pub use errors::{FabricError, FabricResult};
pub use links::LinkTable;

use crate::node::NodeId;

/// Partition control over a set of members.
pub trait ConnectivityFabric: Send + Sync {
    /// Sever the link between `a` and `b` in both directions.
    fn disconnect(&self, a: NodeId, b: NodeId) -> FabricResult<()>;

    /// Restore the link between `a` and `b` in both directions.
    fn reconnect(&self, a: NodeId, b: NodeId) -> FabricResult<()>;

    fn is_reachable(&self, a: NodeId, b: NodeId) -> bool;
}

/// Sever `node` from every member of `peers`.
pub fn isolate(fabric: &dyn ConnectivityFabric, node: NodeId, peers: &[NodeId]) -> FabricResult<()> {
    for peer in peers {
        fabric.disconnect(node, *peer)?;
    }
    Ok(())
}

/// Restore links from `node` to every member of `peers`.
pub fn heal(fabric: &dyn ConnectivityFabric, node: NodeId, peers: &[NodeId]) -> FabricResult<()> {
    for peer in peers {
        fabric.reconnect(node, *peer)?;
    }
    Ok(())
}
