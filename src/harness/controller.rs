//! Rollback Test Controller
//!
//! Drives a three-member set (primary, secondary, arbiter) around the
//! rollback cycle:
//!
//! ```text
//! SteadyStateOps -> RollbackOps -> SyncSourceOpsBeforeRollback
//!     -> SyncSourceOpsDuringRollback -> SteadyStateOps -> ... -> Stopped
//! ```
//!
//! Each transition first checks the phase table and fails before touching
//! the set if the edge is illegal. Within a transition, every wait is a
//! bounded poll (`wait_until`). Transient network errors are retried
//! inside those polls. Anything else ends the run.
//!
//! The controller owns the phase and the primary/secondary assignment.
//! Only the controller mutates connectivity.

use std::time::Duration;

use serde_json::json;

use super::errors::{HarnessError, HarnessResult};
use super::options::RollbackTestOptions;
use super::phase::Phase;
use super::wait::{wait_until, WaitConfig};
use crate::cluster::{ReplicaSet, ShutdownSignal};
use crate::fabric::{heal, isolate};
use crate::node::{CommandError, MemberState, Namespace, NodeHandle, NodeId, WriteConcern};
use crate::observability::{log_event, Event, ObservationScope};
use crate::verify::ConsistencyVerifier;

/// Freeze period for a member that must not stand for election.
const FREEZE_SECS: u64 = 24 * 60 * 60;

/// Step-down period requested from an isolated primary. It cannot be
/// re-elected while isolated anyway.
const STEP_DOWN_SECS: u64 = 1;

fn canary_ns() -> Namespace {
    Namespace::new("EnsureThereIsAtLeastOneOperationToRollback", "ensureRollback")
}

fn term_persisted_ns() -> Namespace {
    Namespace::new("TermGetsPersisted", "ensureRollback")
}

fn applied_surpass_ns() -> Namespace {
    Namespace::new("test", "awaitPrimaryAppliedSurpassesRollbackApplied")
}

/// One rollback run over one replica set.
pub struct RollbackTest {
    name: String,
    rs: ReplicaSet,
    options: RollbackTestOptions,
    phase: Phase,
    primary: NodeId,
    secondary: NodeId,
    arbiter: NodeId,
    last_rbid: Option<i64>,
    skip_db_hash_checks: bool,
}

impl RollbackTest {
    /// Start a standard in-memory set and wrap it.
    pub fn new(options: RollbackTestOptions) -> HarnessResult<Self> {
        let rs = ReplicaSet::standard(&options.name)?.with_liveness_policy(options.liveness_policy);
        Self::with_replica_set(rs, options)
    }

    /// Wrap an already validated set.
    ///
    /// The set's own liveness policy applies; `options.liveness_policy`
    /// is only used by `new`.
    pub fn with_replica_set(mut rs: ReplicaSet, options: RollbackTestOptions) -> HarnessResult<Self> {
        let wait = options.wait();
        rs.await_secondary_nodes(&wait)?;
        let primary = rs.get_primary(&wait)?;
        let secondary = rs
            .get_secondaries()?
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::configuration("replica set has no secondary"))?;
        let arbiter = rs.get_arbiter();

        let primary_host = rs.node(primary).host().to_string();
        let secondary_host = rs.node(secondary).host().to_string();
        log_event(
            &options.name,
            Event::FixtureReady,
            &[("primary", &primary_host), ("secondary", &secondary_host)],
        );

        Ok(Self {
            name: options.name.clone(),
            rs,
            options,
            phase: Phase::SteadyStateOps,
            primary,
            secondary,
            arbiter,
            last_rbid: None,
            skip_db_hash_checks: false,
        })
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn primary(&self) -> &NodeHandle {
        self.rs.node(self.primary)
    }

    pub fn secondary(&self) -> &NodeHandle {
        self.rs.node(self.secondary)
    }

    pub fn arbiter(&self) -> &NodeHandle {
        self.rs.node(self.arbiter)
    }

    /// rbid of the rollback node captured when the current cycle elected
    /// its new primary.
    pub fn last_rbid(&self) -> Option<i64> {
        self.last_rbid
    }

    /// The underlying replica set.
    pub fn test_fixture(&self) -> &ReplicaSet {
        &self.rs
    }

    pub fn skip_db_hash_checks(&self) -> bool {
        self.skip_db_hash_checks
    }

    /// Deadline for the rollback node to finish rollback in
    /// `return_to_steady_state`.
    pub fn set_await_secondary_nodes_for_rollback_timeout(&mut self, timeout: Duration) {
        self.options.await_secondary_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
    }

    fn wait(&self) -> WaitConfig {
        self.options.wait()
    }

    // =========================================================================
    // PHASE TABLE
    // =========================================================================

    fn ensure_can_transition(&self, next: Phase) -> HarnessResult<()> {
        if self.phase.can_transition_to(next) {
            Ok(())
        } else {
            Err(HarnessError::illegal_transition(self.phase.name(), next.name()))
        }
    }

    fn transition(&mut self, next: Phase) -> HarnessResult<()> {
        let from = self.phase;
        self.phase = from.transition_to(next)?;
        log_event(
            &self.name,
            Event::PhaseTransition,
            &[("from", from.name()), ("to", next.name())],
        );
        Ok(())
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Cut the primary off from the secondary. Writes issued on the
    /// returned primary until the next transition will be rolled back.
    pub fn enter_rollback_ops(&mut self) -> HarnessResult<NodeHandle> {
        self.ensure_can_transition(Phase::RollbackOps)?;
        let name = self.name.clone();
        let scope = ObservationScope::new("TRANSITION_TO_ROLLBACK_OPS", &name);
        let result = self.rollback_ops();
        scope.finish(result)
    }

    fn rollback_ops(&mut self) -> HarnessResult<NodeHandle> {
        let wait = self.wait();
        self.rs.await_secondary_nodes(&wait)?;
        self.rs.await_replication(&wait)?;
        self.transition(Phase::RollbackOps)?;

        self.log_link(Event::IsolateNode, self.primary, &[self.secondary]);
        self.rs.fabric().disconnect(self.primary, self.secondary)?;
        Ok(self.primary().clone())
    }

    /// Isolate the primary, elect the secondary and swap roles. Writes on
    /// the returned primary form the history the rollback node converges to.
    pub fn enter_sync_source_ops_before_rollback(&mut self) -> HarnessResult<NodeHandle> {
        self.ensure_can_transition(Phase::SyncSourceOpsBeforeRollback)?;
        let name = self.name.clone();
        let scope = ObservationScope::new("TRANSITION_TO_SYNC_SOURCE_OPS_BEFORE_ROLLBACK", &name);
        let result = self.sync_source_ops_before_rollback();
        scope.finish(result)
    }

    fn sync_source_ops_before_rollback(&mut self) -> HarnessResult<NodeHandle> {
        let wait = self.wait();
        self.transition(Phase::SyncSourceOpsBeforeRollback)?;

        // At least one operation to roll back
        self.primary().insert_one(
            &canary_ns(),
            json!({"thisDocument": "is inserted to ensure rollback is not skipped"}),
        )?;

        let peers = [self.secondary, self.arbiter];
        self.log_link(Event::IsolateNode, self.primary, &peers);
        isolate(self.rs.fabric(), self.primary, &peers)?;

        self.await_step_down(&wait)?;
        self.await_role(self.primary, MemberState::Secondary, &wait)?;

        self.log_link(Event::ReconnectNode, self.secondary, &[self.arbiter]);
        self.rs.fabric().reconnect(self.secondary, self.arbiter)?;

        let candidate = self.secondary;
        self.step_up(candidate, &wait)?;
        std::mem::swap(&mut self.primary, &mut self.secondary);
        log_event(
            &self.name,
            Event::NewPrimaryElected,
            &[("host", self.primary().host())],
        );

        if self.options.rollback_shutdowns {
            self.primary().conn().insert(
                &term_persisted_ns(),
                json!({"thisDocument": "is inserted to ensure rollback is not skipped"}),
                &WriteConcern::journaled(),
            )?;
        }

        let rbid = self.secondary().conn().repl_set_get_rbid()?;
        self.last_rbid = Some(rbid);
        let rbid_text = rbid.to_string();
        log_event(
            &self.name,
            Event::RbidSnapshot,
            &[("host", self.secondary().host()), ("rbid", &rbid_text)],
        );

        if self.rs.requires_refetch_liveness_wait(self.secondary)? {
            self.await_primary_applied_surpasses_rollback_applied()?;
        }
        Ok(self.primary().clone())
    }

    /// Reconnect the rollback node so it starts rolling back.
    ///
    /// Operations issued on the returned primary afterwards may land
    /// before, during or after the rollback itself; no ordering is
    /// promised.
    pub fn enter_sync_source_ops_during_rollback(&mut self) -> HarnessResult<NodeHandle> {
        self.ensure_can_transition(Phase::SyncSourceOpsDuringRollback)?;
        let name = self.name.clone();
        let scope = ObservationScope::new("TRANSITION_TO_SYNC_SOURCE_OPS_DURING_ROLLBACK", &name);
        let result = self.sync_source_ops_during_rollback();
        scope.finish(result)
    }

    fn sync_source_ops_during_rollback(&mut self) -> HarnessResult<NodeHandle> {
        self.transition(Phase::SyncSourceOpsDuringRollback)?;
        let peers = [self.primary, self.arbiter];
        self.log_link(Event::ReconnectNode, self.secondary, &peers);
        heal(self.rs.fabric(), self.secondary, &peers)?;
        Ok(self.primary().clone())
    }

    /// Wait for the rollback node to finish rollback and catch up, then
    /// check every member holds the same data.
    ///
    /// If the rollback node reports that it can never finish, the set is
    /// stopped, the run moves to `Stopped` and an `Unrecoverable` error
    /// is returned.
    pub fn return_to_steady_state(&mut self) -> HarnessResult<NodeHandle> {
        self.ensure_can_transition(Phase::SteadyStateOps)?;
        let name = self.name.clone();
        let scope = ObservationScope::new("TRANSITION_TO_STEADY_STATE_OPS", &name);
        let result = self.steady_state_ops();
        scope.finish(result)
    }

    fn steady_state_ops(&mut self) -> HarnessResult<NodeHandle> {
        let peers = [self.primary, self.arbiter];
        self.log_link(Event::ReconnectNode, self.secondary, &peers);
        heal(self.rs.fabric(), self.secondary, &peers)?;

        match self.await_rollback() {
            Ok(()) => {}
            Err(err) if err.is_unrecoverable_rollback() => return Err(self.abort_unrecoverable(err)),
            Err(err) => return Err(err),
        }

        let wait = self.wait();
        self.rs.await_replication(&wait)?;
        self.transition(Phase::SteadyStateOps)?;
        self.check_data_consistency()?;
        Ok(self.primary().clone())
    }

    /// Check consistency one last time and stop the set.
    pub fn stop(&mut self) -> HarnessResult<()> {
        self.ensure_can_transition(Phase::Stopped)?;
        let name = self.name.clone();
        let scope = ObservationScope::new("STOP", &name);
        let result = self.check_data_consistency().and_then(|()| {
            self.transition(Phase::Stopped)?;
            self.rs.stop_all()
        });
        scope.finish(result)
    }

    // =========================================================================
    // WAITS
    // =========================================================================

    /// Force the isolated primary to step down. Failures are logged and
    /// ignored: the node may already be stepping down on its own.
    fn await_step_down(&self, wait: &WaitConfig) -> HarnessResult<()> {
        let node = self.primary();
        log_event(&self.name, Event::AwaitStepDown, &[("host", node.host())]);

        let result = wait_until("isolated primary to step down", wait, || {
            match node.conn().repl_set_step_down(STEP_DOWN_SECS, true) {
                Ok(()) | Err(CommandError::NotPrimary) => Ok(true),
                Err(CommandError::UnrecoverableRollback(reason)) => {
                    Err(CommandError::UnrecoverableRollback(reason).into())
                }
                Err(err) => {
                    let error = err.to_string();
                    log_event(&self.name, Event::StepDownIgnored, &[("error", &error)]);
                    Ok(false)
                }
            }
        });
        match result {
            Err(err) if err.is_unrecoverable_rollback() => Err(err),
            Err(err) => {
                log_event(&self.name, Event::StepDownIgnored, &[("error", &err.message)]);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    fn await_role(&mut self, id: NodeId, role: MemberState, wait: &WaitConfig) -> HarnessResult<()> {
        let what = format!("{} to reach {}", id, role);
        let node = self.rs.node_mut(id);
        wait_until(&what, wait, || Ok(node.refresh_role()? == role))
    }

    /// Run an election on `candidate` until it is the single primary.
    fn step_up(&mut self, candidate: NodeId, wait: &WaitConfig) -> HarnessResult<()> {
        log_event(
            &self.name,
            Event::AwaitElection,
            &[("host", self.rs.node(candidate).host())],
        );
        let node = self.rs.node_mut(candidate);
        wait_until("step up to succeed", wait, || {
            match node.conn().repl_set_step_up() {
                Ok(()) => Ok(node.refresh_role()? == MemberState::Primary),
                Err(CommandError::NotEligible(_)) | Err(CommandError::NotPrimary) => Ok(false),
                Err(err) => Err(err.into()),
            }
        })?;

        let elected = self.rs.get_primary(wait)?;
        if elected != candidate {
            return Err(HarnessError::fatal(format!(
                "expected {} to be elected but {} is primary",
                self.rs.node(candidate).host(),
                self.rs.node(elected).host()
            )));
        }
        Ok(())
    }

    /// Write to the primary until its applied optime reaches the rollback
    /// node's. Rollback by refetch cannot finish before that.
    pub fn await_primary_applied_surpasses_rollback_applied(&mut self) -> HarnessResult<()> {
        if self.phase != Phase::SyncSourceOpsBeforeRollback {
            return Err(HarnessError::precondition(format!(
                "can only wait for the primary's applied optime in phase {}, not {}",
                Phase::SyncSourceOpsBeforeRollback,
                self.phase
            )));
        }

        let rollback_applied = self.secondary().applied_op_time()?;
        let rollback_applied_text = rollback_applied.to_string();
        log_event(
            &self.name,
            Event::AwaitAppliedSurpass,
            &[
                ("host", self.primary().host()),
                ("rollback_applied", &rollback_applied_text),
            ],
        );

        let primary = self.primary();
        let ns = applied_surpass_ns();
        wait_until("primary applied optime to surpass the rollback node's", &self.wait(), || {
            if primary.applied_op_time()? >= rollback_applied {
                return Ok(true);
            }
            primary.insert_one(&ns, json!({}))?;
            Ok(false)
        })
    }

    /// Rollback is done once the node is SECONDARY, its rbid moved past
    /// the snapshot and its newest oplog entry matches the primary's.
    fn await_rollback(&mut self) -> HarnessResult<()> {
        let last_rbid = self
            .last_rbid
            .ok_or_else(|| HarnessError::fatal("no rbid was captured for this rollback cycle"))?;
        let wait = self.options.rollback_wait();
        let rollback_host = self.secondary().host().to_string();
        log_event(&self.name, Event::AwaitRollback, &[("host", &rollback_host)]);

        let primary = self.rs.node(self.primary).clone();
        let node = self.rs.node_mut(self.secondary);
        let mut final_rbid = last_rbid;
        wait_until("rollback node to finish rollback", &wait, || {
            if node.refresh_role()? != MemberState::Secondary {
                return Ok(false);
            }
            let rbid = node.conn().repl_set_get_rbid()?;
            if rbid <= last_rbid {
                return Ok(false);
            }
            final_rbid = rbid;
            Ok(node.conn().oplog_top()? == primary.conn().oplog_top()?)
        })?;

        let rbid_text = final_rbid.to_string();
        log_event(
            &self.name,
            Event::RollbackComplete,
            &[("host", &rollback_host), ("rbid", &rbid_text)],
        );
        Ok(())
    }

    fn abort_unrecoverable(&mut self, err: HarnessError) -> HarnessError {
        log_event(
            &self.name,
            Event::UnrecoverableRollback,
            &[("host", self.secondary().host()), ("error", &err.message)],
        );
        self.skip_db_hash_checks = true;
        if let Err(stop_err) = self.rs.stop_all() {
            log_event(
                &self.name,
                Event::ClusterStopped,
                &[("error", &stop_err.message)],
            );
        }
        // No further cycles are possible
        self.phase = Phase::Stopped;
        err
    }

    // =========================================================================
    // CONSISTENCY
    // =========================================================================

    fn check_data_consistency(&self) -> HarnessResult<()> {
        if self.skip_db_hash_checks {
            return Ok(());
        }
        let nodes: Vec<NodeHandle> = [self.primary, self.secondary, self.arbiter]
            .iter()
            .map(|id| self.rs.node(*id).clone())
            .collect();
        ConsistencyVerifier::new(&self.name, self.options.verifier()).verify(&nodes)
    }

    // =========================================================================
    // RESTARTS
    // =========================================================================

    /// Restart member `id` with `signal`.
    ///
    /// Does nothing unless the run allows shutdowns, and never restarts
    /// the arbiter. `Kill` becomes `Term` unless unclean shutdowns are
    /// allowed. A restarted primary is stepped back up while the secondary
    /// is frozen.
    pub fn restart_node(&mut self, id: NodeId, signal: ShutdownSignal) -> HarnessResult<()> {
        let host = self
            .rs
            .get(id)
            .map(|n| n.host().to_string())
            .ok_or_else(|| HarnessError::precondition(format!("{} is not a member", id)))?;

        if !self.options.rollback_shutdowns {
            log_event(
                &self.name,
                Event::NodeRestartSkipped,
                &[("host", &host), ("reason", "rollback shutdowns are disabled")],
            );
            return Ok(());
        }
        if id == self.arbiter {
            log_event(
                &self.name,
                Event::NodeRestartSkipped,
                &[("host", &host), ("reason", "arbiter")],
            );
            return Ok(());
        }

        let signal = if signal == ShutdownSignal::Kill && !self.options.allow_unclean_shutdowns {
            ShutdownSignal::Term
        } else {
            signal
        };
        let signal_text = signal.number().to_string();
        log_event(
            &self.name,
            Event::NodeRestart,
            &[("host", &host), ("signal", &signal_text)],
        );

        let wait = self.wait();
        self.rs.restart(id, signal)?;

        if id == self.primary {
            let secondary = self.secondary;
            self.rs.freeze(secondary, FREEZE_SECS)?;
            self.step_up(id, &wait)?;

            let node = self.rs.node(secondary);
            wait_until("secondary to unfreeze", &wait, || {
                match node.conn().repl_set_freeze(0) {
                    Ok(()) => Ok(true),
                    Err(err) if err.is_network_error() => Ok(false),
                    Err(err) => Err(err.into()),
                }
            })?;
        }

        self.secondary = self
            .rs
            .data_bearing()
            .into_iter()
            .find(|n| *n != self.primary)
            .ok_or_else(|| HarnessError::fatal("replica set has no secondary"))?;
        self.await_role(self.secondary, MemberState::Secondary, &wait)
    }

    fn log_link(&self, event: Event, node: NodeId, peers: &[NodeId]) {
        let peers = peers
            .iter()
            .map(|p| self.rs.node(*p).host())
            .collect::<Vec<_>>()
            .join(",");
        log_event(
            &self.name,
            event,
            &[("host", self.rs.node(node).host()), ("peers", &peers)],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::HarnessErrorKind;

    fn fast(name: &str) -> RollbackTestOptions {
        RollbackTestOptions::named(name).with_wait(1, 5_000)
    }

    #[test]
    fn test_starts_in_steady_state() {
        let rt = RollbackTest::new(fast("ctl_start")).unwrap();
        assert_eq!(rt.phase(), Phase::SteadyStateOps);
        assert_eq!(rt.primary().id(), NodeId(0));
        assert_eq!(rt.secondary().id(), NodeId(1));
        assert_eq!(rt.arbiter().id(), NodeId(2));
        assert_eq!(rt.last_rbid(), None);
    }

    #[test]
    fn test_rollback_timeout_saturates_for_huge_durations() {
        let mut rt = RollbackTest::new(fast("ctl_huge_timeout")).unwrap();
        rt.set_await_secondary_nodes_for_rollback_timeout(Duration::MAX);
        assert_eq!(rt.options.await_secondary_timeout_ms, Some(u64::MAX));

        rt.set_await_secondary_nodes_for_rollback_timeout(Duration::from_secs(30));
        assert_eq!(rt.options.await_secondary_timeout_ms, Some(30_000));
    }

    #[test]
    fn test_illegal_transition_leaves_phase_untouched() {
        let mut rt = RollbackTest::new(fast("ctl_illegal")).unwrap();
        let err = rt.enter_sync_source_ops_during_rollback().unwrap_err();
        assert_eq!(err.kind, HarnessErrorKind::Precondition);
        assert_eq!(rt.phase(), Phase::SteadyStateOps);
        assert!(rt.test_fixture().fabric().is_reachable(NodeId(0), NodeId(1)));
    }

    #[test]
    fn test_rollback_ops_keeps_primary() {
        let mut rt = RollbackTest::new(fast("ctl_rollback_ops")).unwrap();
        let primary = rt.enter_rollback_ops().unwrap();
        let fabric = rt.test_fixture().fabric();
        assert_eq!(primary.id(), NodeId(0));
        assert!(!fabric.is_reachable(NodeId(0), NodeId(1)));
        assert!(fabric.is_reachable(NodeId(0), NodeId(2)));
        assert!(primary.conn().is_master().unwrap().ismaster);
    }

    #[test]
    fn test_applied_wait_requires_phase() {
        let mut rt = RollbackTest::new(fast("ctl_applied_phase")).unwrap();
        let err = rt.await_primary_applied_surpasses_rollback_applied().unwrap_err();
        assert_eq!(err.kind, HarnessErrorKind::Precondition);
    }

    #[test]
    fn test_restart_ignored_without_rollback_shutdowns() {
        let mut rt = RollbackTest::new(fast("ctl_restart_off")).unwrap();
        rt.restart_node(NodeId(0), ShutdownSignal::Kill).unwrap();
        assert_eq!(rt.primary().id(), NodeId(0));
        assert!(rt.primary().conn().is_master().unwrap().ismaster);
    }

    #[test]
    fn test_stop_twice_is_illegal() {
        let mut rt = RollbackTest::new(fast("ctl_stop")).unwrap();
        rt.stop().unwrap();
        assert_eq!(rt.phase(), Phase::Stopped);
        assert_eq!(rt.stop().unwrap_err().kind, HarnessErrorKind::Precondition);
    }
}
