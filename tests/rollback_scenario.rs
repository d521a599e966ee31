//! Rollback Scenario Tests
//!
//! Drives a full primary/secondary/arbiter set through rollback cycles:
//! - Role swap after the election
//! - rbid strictly increases on the rollback node
//! - Oplog tails match once back in steady state
//! - Rolled back writes disappear, sync source writes survive

use std::sync::Arc;

use serde_json::json;

use rollback_harness::cluster::{LivenessPolicy, ReplicaSet};
use rollback_harness::harness::{Phase, RollbackTest, RollbackTestOptions};
use rollback_harness::node::{MemberState, Namespace};
use rollback_harness::sim::{SimCluster, StorageProfile};

fn options(name: &str) -> RollbackTestOptions {
    RollbackTestOptions::named(name).with_wait(1, 5_000)
}

fn ns() -> Namespace {
    Namespace::new("test", "scenario")
}

// =============================================================================
// End-to-End Scenario
// =============================================================================

#[test]
fn test_end_to_end_rollback() {
    let mut rt = RollbackTest::new(options("scenario_e2e")).unwrap();
    let p = rt.primary().id();
    let s = rt.secondary().id();
    let a = rt.arbiter().id();

    // RollbackOps: P cut off from S only and still primary
    let primary = rt.enter_rollback_ops().unwrap();
    assert_eq!(primary.id(), p);
    {
        let fabric = rt.test_fixture().fabric();
        assert!(!fabric.is_reachable(p, s));
        assert!(!fabric.is_reachable(s, p));
        assert!(fabric.is_reachable(p, a));
    }
    assert_eq!(primary.conn().is_master().unwrap().state, MemberState::Primary);
    primary.insert_one(&ns(), json!({"_id": "D1"})).unwrap();

    // SyncSourceOpsBeforeRollback: S elected, P demoted, D1 never reached S
    let new_primary = rt.enter_sync_source_ops_before_rollback().unwrap();
    assert_eq!(new_primary.id(), s);
    assert_eq!(rt.primary().id(), s);
    assert_eq!(rt.primary().role(), MemberState::Primary);
    assert_eq!(rt.secondary().id(), p);
    assert_eq!(rt.secondary().role(), MemberState::Secondary);
    assert!(new_primary.conn().find_all(&ns()).unwrap().is_empty());
    let rbid_before = rt.last_rbid().unwrap();

    // SyncSourceOpsDuringRollback: P reconnected
    let primary = rt.enter_sync_source_ops_during_rollback().unwrap();
    assert!(rt.test_fixture().fabric().is_reachable(p, s));
    assert!(rt.test_fixture().fabric().is_reachable(p, a));
    primary.insert_one(&ns(), json!({"_id": "D2"})).unwrap();

    // SteadyStateOps: P rolled back and caught up
    let primary = rt.return_to_steady_state().unwrap();
    assert_eq!(rt.phase(), Phase::SteadyStateOps);
    assert_eq!(primary.id(), s);

    let rollback_node = rt.secondary();
    assert_eq!(rollback_node.id(), p);
    assert_eq!(
        rollback_node.conn().is_master().unwrap().state,
        MemberState::Secondary
    );
    assert_eq!(
        rollback_node.conn().find_all(&ns()).unwrap(),
        vec![json!({"_id": "D2"})]
    );
    assert_eq!(
        rollback_node.conn().oplog_top().unwrap(),
        primary.conn().oplog_top().unwrap()
    );
    assert!(rollback_node.conn().repl_set_get_rbid().unwrap() >= rbid_before + 1);

    rt.stop().unwrap();
    assert_eq!(rt.phase(), Phase::Stopped);
}

/// The canary write lands on the old primary and is rolled back with it.
#[test]
fn test_canary_write_is_rolled_back() {
    let mut rt = RollbackTest::new(options("scenario_canary")).unwrap();
    let canary = Namespace::new("EnsureThereIsAtLeastOneOperationToRollback", "ensureRollback");
    let old_primary = rt.primary().clone();

    rt.enter_rollback_ops().unwrap();
    rt.enter_sync_source_ops_before_rollback().unwrap();
    assert_eq!(old_primary.conn().count(&canary).unwrap(), 1);

    rt.enter_sync_source_ops_during_rollback().unwrap();
    rt.return_to_steady_state().unwrap();
    assert_eq!(old_primary.conn().count(&canary).unwrap(), 0);
    assert!(!old_primary
        .conn()
        .list_databases()
        .unwrap()
        .contains(&canary.db));
}

// =============================================================================
// Repeated Cycles
// =============================================================================

#[test]
fn test_repeated_cycles_alternate_roles() {
    let mut rt = RollbackTest::new(options("scenario_cycles")).unwrap();
    let first = rt.primary().id();
    let second = rt.secondary().id();

    for cycle in 0..4u32 {
        let doomed = rt.enter_rollback_ops().unwrap();
        doomed
            .insert_one(&ns(), json!({"_id": format!("doomed-{}", cycle)}))
            .unwrap();
        let primary = rt.enter_sync_source_ops_before_rollback().unwrap();
        primary
            .insert_one(&ns(), json!({"_id": format!("kept-{}", cycle)}))
            .unwrap();
        let rbid_before = rt.last_rbid().unwrap();
        rt.enter_sync_source_ops_during_rollback().unwrap();
        let primary = rt.return_to_steady_state().unwrap();

        let expected_primary = if cycle % 2 == 0 { second } else { first };
        assert_eq!(primary.id(), expected_primary);
        assert_eq!(rt.secondary().id(), doomed.id());
        assert!(rt.secondary().conn().repl_set_get_rbid().unwrap() > rbid_before);
        assert_eq!(
            primary.conn().count(&ns()).unwrap(),
            u64::from(cycle + 1),
            "only the kept writes survive"
        );
    }
    rt.stop().unwrap();
}

// =============================================================================
// Refetch Liveness Wait
// =============================================================================

#[test]
fn test_always_policy_waits_for_primary_applied() {
    let options = options("scenario_liveness").with_liveness_policy(LivenessPolicy::Always);
    let mut rt = RollbackTest::new(options).unwrap();

    rt.enter_rollback_ops().unwrap();
    rt.enter_sync_source_ops_before_rollback().unwrap();
    let primary_applied = rt.primary().conn().repl_set_get_status().unwrap().applied_op_time;
    let rollback_applied = rt.secondary().conn().repl_set_get_status().unwrap().applied_op_time;
    assert!(primary_applied >= rollback_applied);

    rt.enter_sync_source_ops_during_rollback().unwrap();
    rt.return_to_steady_state().unwrap();
    rt.stop().unwrap();
}

#[test]
fn test_in_memory_engine_requires_liveness_wait() {
    let sim = SimCluster::builder("scenario_in_memory")
        .with_storage(StorageProfile {
            storage_engine: "inMemory".to_string(),
            supports_committed_reads: true,
        })
        .build();
    let rs = ReplicaSet::adopt(Arc::new(sim)).unwrap();
    let mut rt = RollbackTest::with_replica_set(rs, options("scenario_in_memory")).unwrap();

    rt.enter_rollback_ops().unwrap();
    rt.enter_sync_source_ops_before_rollback().unwrap();
    let rollback_node = rt.secondary().id();
    assert!(rt
        .test_fixture()
        .requires_refetch_liveness_wait(rollback_node)
        .unwrap());

    rt.enter_sync_source_ops_during_rollback().unwrap();
    rt.return_to_steady_state().unwrap();
    rt.stop().unwrap();
}

#[test]
fn test_custom_rollback_wait_timeout() {
    let mut rt = RollbackTest::new(options("scenario_rollback_timeout")).unwrap();
    rt.set_await_secondary_nodes_for_rollback_timeout(std::time::Duration::from_secs(30));

    rt.enter_rollback_ops().unwrap();
    rt.enter_sync_source_ops_before_rollback().unwrap();
    rt.enter_sync_source_ops_during_rollback().unwrap();
    rt.return_to_steady_state().unwrap();
    rt.stop().unwrap();
}
