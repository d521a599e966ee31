//! Cluster Lifecycle Manager
//!
//! Adopts a three-member set from a `ClusterBackend`, checks it meets the
//! fixture's requirements, and offers the set-wide waits the rollback
//! controller builds on (primary discovery, secondary readiness,
//! replication barrier) plus restart and teardown.

use std::sync::Arc;

use super::backend::{ClusterBackend, ShutdownSignal};
use super::config::ReplSetConfig;
use super::policy::LivenessPolicy;
use crate::fabric::ConnectivityFabric;
use crate::harness::{wait_until, HarnessError, HarnessResult, WaitConfig};
use crate::node::{MemberState, NodeHandle, NodeId};
use crate::observability::{log_event, Event};
use crate::sim::SimCluster;

/// A validated three-member replica set.
pub struct ReplicaSet {
    config: ReplSetConfig,
    backend: Arc<dyn ClusterBackend>,
    fabric: Arc<dyn ConnectivityFabric>,
    nodes: Vec<NodeHandle>,
    liveness: LivenessPolicy,
    stopped: bool,
}

impl ReplicaSet {
    /// Adopt an externally started set.
    ///
    /// Fails with a configuration error unless the set has exactly three
    /// members including one arbiter, runs behind a connectivity fabric,
    /// and was initiated with an effectively infinite election timeout.
    pub fn adopt(backend: Arc<dyn ClusterBackend>) -> HarnessResult<Self> {
        let config = backend.config();
        config.validate()?;

        let fabric = backend.fabric().ok_or_else(|| {
            HarnessError::configuration("must set up the replica set with a bridge enabled")
        })?;

        let mut nodes = Vec::with_capacity(config.members.len());
        for member in &config.members {
            let conn = backend.connect(member.id)?;
            // Refined on first observation
            let role = if member.arbiter_only {
                MemberState::Arbiter
            } else {
                MemberState::Secondary
            };
            nodes.push(NodeHandle::new(member.id, conn, role));
        }

        Ok(Self {
            config,
            backend,
            fabric,
            nodes,
            liveness: LivenessPolicy::default(),
            stopped: false,
        })
    }

    /// Start and adopt a standard in-memory set named `name`.
    pub fn standard(name: &str) -> HarnessResult<Self> {
        Self::adopt(Arc::new(SimCluster::standard(name)))
    }

    pub fn with_liveness_policy(mut self, policy: LivenessPolicy) -> Self {
        self.liveness = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ReplSetConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Handle of member `id`.
    ///
    /// # Panics
    ///
    /// If `id` is not a member. Ids handed out by this set always are.
    pub fn node(&self, id: NodeId) -> &NodeHandle {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeHandle> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeHandle {
        &mut self.nodes[id.index()]
    }

    pub fn fabric(&self) -> &dyn ConnectivityFabric {
        self.fabric.as_ref()
    }

    pub fn liveness_policy(&self) -> LivenessPolicy {
        self.liveness
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The arbiter. Validation guarantees there is exactly one.
    pub fn get_arbiter(&self) -> NodeId {
        self.config.arbiters()[0]
    }

    pub fn data_bearing(&self) -> Vec<NodeId> {
        self.config.data_bearing()
    }

    fn ensure_running(&self) -> HarnessResult<()> {
        if self.stopped {
            return Err(HarnessError::precondition(format!(
                "replica set {} has been stopped",
                self.name()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    /// Wait until exactly one member reports itself primary.
    pub fn get_primary(&mut self, wait: &WaitConfig) -> HarnessResult<NodeId> {
        self.ensure_running()?;
        let mut found = None;
        let nodes = &mut self.nodes;

        wait_until("a single primary", wait, || {
            let mut primaries = Vec::new();
            for node in nodes.iter_mut() {
                match node.refresh_role() {
                    Ok(MemberState::Primary) => primaries.push(node.id()),
                    Ok(_) => {}
                    Err(err) if err.is_network_error() => {}
                    Err(err) => return Err(err.into()),
                }
            }
            if primaries.len() == 1 {
                found = primaries.pop();
                Ok(true)
            } else {
                Ok(false)
            }
        })?;

        found.ok_or_else(|| HarnessError::fatal("primary discovery finished without a primary"))
    }

    /// Data-bearing members currently reporting SECONDARY.
    pub fn get_secondaries(&mut self) -> HarnessResult<Vec<NodeId>> {
        self.ensure_running()?;
        let mut secondaries = Vec::new();
        for id in self.data_bearing() {
            if self.node_mut(id).refresh_role()? == MemberState::Secondary {
                secondaries.push(id);
            }
        }
        Ok(secondaries)
    }

    /// Wait for every non-primary member to settle into its steady role.
    pub fn await_secondary_nodes(&mut self, wait: &WaitConfig) -> HarnessResult<()> {
        let primary = self.get_primary(wait)?;
        let arbiter = self.get_arbiter();
        let nodes = &mut self.nodes;

        wait_until("secondaries to be ready", wait, || {
            for node in nodes.iter_mut().filter(|n| n.id() != primary) {
                let expected = if node.id() == arbiter {
                    MemberState::Arbiter
                } else {
                    MemberState::Secondary
                };
                if node.refresh_role()? != expected {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    /// Wait until every data-bearing member has applied the primary's
    /// latest operation.
    pub fn await_replication(&mut self, wait: &WaitConfig) -> HarnessResult<()> {
        let primary = self.get_primary(wait)?;
        let secondaries: Vec<NodeId> = self
            .data_bearing()
            .into_iter()
            .filter(|id| *id != primary)
            .collect();
        let nodes = &self.nodes;

        wait_until("replication to all secondaries", wait, || {
            let target = nodes[primary.index()].applied_op_time()?;
            for id in &secondaries {
                if nodes[id.index()].applied_op_time()? < target {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    /// Whether the refetch liveness wait applies to `rollback_node`.
    pub fn requires_refetch_liveness_wait(&self, rollback_node: NodeId) -> HarnessResult<bool> {
        let status = self.node(rollback_node).conn().server_status()?;
        Ok(self.liveness.requires_applied_wait(&status))
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Suppress elections on `id` for `secs` seconds; `0` lifts the freeze.
    pub fn freeze(&self, id: NodeId, secs: u64) -> HarnessResult<()> {
        self.ensure_running()?;
        self.node(id).conn().repl_set_freeze(secs)?;
        Ok(())
    }

    /// Restart member `id`, keeping its data.
    pub fn restart(&mut self, id: NodeId, signal: ShutdownSignal) -> HarnessResult<()> {
        self.ensure_running()?;
        if self.get(id).is_none() {
            return Err(HarnessError::precondition(format!("{} is not a member", id)));
        }
        self.backend.restart(id, signal)?;
        self.node_mut(id).observe_role(MemberState::Unreachable);
        Ok(())
    }

    /// Stop every member. Idempotent.
    pub fn stop_all(&mut self) -> HarnessResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.backend.stop_all()?;
        self.stopped = true;
        for node in &mut self.nodes {
            node.observe_role(MemberState::Unreachable);
        }
        log_event(&self.config.name, Event::ClusterStopped, &[]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::HarnessErrorKind;

    fn fast() -> WaitConfig {
        WaitConfig::from_millis(1, 2_000)
    }

    #[test]
    fn test_standard_set_has_primary_and_arbiter() {
        let mut rs = ReplicaSet::standard("rs_standard").unwrap();
        assert_eq!(rs.get_primary(&fast()).unwrap(), NodeId(0));
        assert_eq!(rs.get_arbiter(), NodeId(2));
        assert_eq!(rs.get_secondaries().unwrap(), vec![NodeId(1)]);
        assert_eq!(rs.node(NodeId(0)).role(), MemberState::Primary);
    }

    #[test]
    fn test_rejects_set_without_bridge() {
        let sim = SimCluster::builder("rs_no_bridge").without_bridge().build();
        let err = ReplicaSet::adopt(Arc::new(sim)).err().unwrap();
        assert_eq!(err.kind, HarnessErrorKind::Configuration);
        assert!(err.message.contains("bridge"));
    }

    #[test]
    fn test_rejects_low_election_timeout() {
        let mut config = ReplSetConfig::standard("rs_low_timeout");
        config.settings.election_timeout_millis = 10_000;
        let sim = SimCluster::builder("rs_low_timeout").with_config(config).build();
        let err = ReplicaSet::adopt(Arc::new(sim)).err().unwrap();
        assert_eq!(err.kind, HarnessErrorKind::Configuration);
    }

    #[test]
    fn test_await_replication_after_writes() {
        let mut rs = ReplicaSet::standard("rs_replication").unwrap();
        let primary = rs.get_primary(&fast()).unwrap();
        let ns = crate::node::Namespace::new("test", "c");
        rs.node(primary)
            .insert_one(&ns, serde_json::json!({"_id": 1}))
            .unwrap();

        rs.await_replication(&fast()).unwrap();
        assert_eq!(rs.node(NodeId(1)).conn().count(&ns).unwrap(), 1);
    }

    #[test]
    fn test_stop_all_is_idempotent() {
        let mut rs = ReplicaSet::standard("rs_stop").unwrap();
        rs.stop_all().unwrap();
        rs.stop_all().unwrap();
        assert!(rs.is_stopped());
        assert_eq!(rs.node(NodeId(0)).role(), MemberState::Unreachable);
        assert!(rs.get_primary(&fast()).is_err());
    }
}
