//! Symmetric link table.

use std::collections::BTreeSet;

use super::errors::{FabricError, FabricResult};
use crate::node::NodeId;

/// Pairwise reachability over a fixed member set.
///
/// A link is either up or down; severing `a-b` also severs `b-a`. Links
/// start up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    members: BTreeSet<NodeId>,
    severed: BTreeSet<(NodeId, NodeId)>,
}

impl LinkTable {
    /// Create a fully connected table over `members`.
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            members: members.into_iter().collect(),
            severed: BTreeSet::new(),
        }
    }

    fn key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn check(&self, a: NodeId, b: NodeId) -> FabricResult<()> {
        for node in [a, b] {
            if !self.members.contains(&node) {
                return Err(FabricError::UnknownNode(node));
            }
        }
        if a == b {
            return Err(FabricError::SelfLink(a));
        }
        Ok(())
    }

    /// Take the link between `a` and `b` down. Idempotent.
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) -> FabricResult<()> {
        self.check(a, b)?;
        self.severed.insert(Self::key(a, b));
        Ok(())
    }

    /// Bring the link between `a` and `b` back up. Idempotent.
    pub fn reconnect(&mut self, a: NodeId, b: NodeId) -> FabricResult<()> {
        self.check(a, b)?;
        self.severed.remove(&Self::key(a, b));
        Ok(())
    }

    /// A node always reaches itself; unknown nodes reach nothing.
    pub fn is_reachable(&self, a: NodeId, b: NodeId) -> bool {
        if !self.members.contains(&a) || !self.members.contains(&b) {
            return false;
        }
        a == b || !self.severed.contains(&Self::key(a, b))
    }

    /// Currently severed pairs, smaller id first.
    pub fn severed_links(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.severed.iter().copied()
    }

    pub fn is_fully_connected(&self) -> bool {
        self.severed.is_empty()
    }
}
