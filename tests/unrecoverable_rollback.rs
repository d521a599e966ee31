//! Unrecoverable Rollback Tests
//!
//! When the sync source no longer holds the history the rollback node
//! needs, the run must end: hash checks are skipped, the set is stopped
//! and no further transition is accepted.

use std::sync::Arc;

use serde_json::json;

use rollback_harness::cluster::ReplicaSet;
use rollback_harness::harness::{HarnessErrorKind, Phase, RollbackTest, RollbackTestOptions};
use rollback_harness::node::{CommandError, Namespace};
use rollback_harness::sim::SimCluster;

#[test]
fn test_lost_history_aborts_the_run() {
    let sim = SimCluster::standard("unrecoverable");
    let rs = ReplicaSet::adopt(Arc::new(sim.clone())).unwrap();
    let mut rt = RollbackTest::with_replica_set(
        rs,
        RollbackTestOptions::named("unrecoverable").with_wait(1, 5_000),
    )
    .unwrap();

    rt.enter_rollback_ops()
        .unwrap()
        .insert_one(&Namespace::new("test", "c"), json!({"_id": "doomed"}))
        .unwrap();
    let new_primary = rt.enter_sync_source_ops_before_rollback().unwrap();
    let rollback_node = rt.secondary().clone();

    // The sync source's oplog rolls over past the common point
    sim.discard_history(new_primary.id()).unwrap();

    rt.enter_sync_source_ops_during_rollback().unwrap();
    let err = rt.return_to_steady_state().unwrap_err();

    assert_eq!(err.kind, HarnessErrorKind::Unrecoverable);
    assert!(err.is_unrecoverable_rollback());
    assert_eq!(rt.phase(), Phase::Stopped);
    assert!(rt.skip_db_hash_checks());
    assert!(rt.test_fixture().is_stopped());

    assert!(matches!(
        rollback_node.conn().is_master(),
        Err(CommandError::UnrecoverableRollback(_))
    ));
    assert_eq!(
        rt.enter_rollback_ops().unwrap_err().kind,
        HarnessErrorKind::Precondition
    );
}

#[test]
fn test_rollback_within_history_still_succeeds() {
    let sim = SimCluster::standard("recoverable");
    let rs = ReplicaSet::adopt(Arc::new(sim.clone())).unwrap();
    let mut rt = RollbackTest::with_replica_set(
        rs,
        RollbackTestOptions::named("recoverable").with_wait(1, 5_000),
    )
    .unwrap();

    // History discarded before the cycle starts does not matter
    sim.discard_history(rt.secondary().id()).unwrap();

    rt.enter_rollback_ops().unwrap();
    rt.enter_sync_source_ops_before_rollback().unwrap();
    rt.enter_sync_source_ops_during_rollback().unwrap();
    rt.return_to_steady_state().unwrap();
    assert!(!rt.skip_db_hash_checks());
    rt.stop().unwrap();
}
