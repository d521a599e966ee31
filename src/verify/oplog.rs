//! Oplog comparison.
//!
//! Oplogs are compared from the newest entry backwards over the length of
//! the shorter one. Older entries may already have been truncated on one
//! side, but an empty oplog never matches a non-empty one.

use super::report::{ConsistencyReport, Mismatch};
use crate::harness::HarnessResult;
use crate::node::{NodeHandle, OplogEntry};

const NO_ENTRY: &str = "<none>";

pub(crate) fn check_oplogs(members: &[NodeHandle], report: &mut ConsistencyReport) -> HarnessResult<()> {
    let Some((reference, rest)) = members.split_first() else {
        return Ok(());
    };
    let reference_oplog = reference.conn().oplog()?;

    for member in rest {
        let oplog = member.conn().oplog()?;
        if let Some((position, expected, actual)) = first_difference(&reference_oplog, &oplog) {
            report.push(Mismatch::Oplog {
                reference: reference.host().to_string(),
                member: member.host().to_string(),
                position,
                reference_entry: render(expected),
                member_entry: render(actual),
            });
        }
    }
    Ok(())
}

fn first_difference<'a>(
    reference: &'a [OplogEntry],
    member: &'a [OplogEntry],
) -> Option<(usize, Option<&'a OplogEntry>, Option<&'a OplogEntry>)> {
    if reference.is_empty() != member.is_empty() {
        return Some((0, reference.last(), member.last()));
    }
    reference
        .iter()
        .rev()
        .zip(member.iter().rev())
        .enumerate()
        .find(|(_, (a, b))| a != b)
        .map(|(position, (a, b))| (position, Some(a), Some(b)))
}

fn render(entry: Option<&OplogEntry>) -> String {
    match entry {
        Some(entry) => serde_json::to_string(entry).unwrap_or_default(),
        None => NO_ENTRY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cluster::ClusterBackend;
    use crate::node::{
        CollectionInfo, CollectionOptions, CommandResult, DbHashReply, Document, IsMasterReply,
        MemberState, Namespace, NodeConnection, NodeId, ReplSetStatus, ServerStatus,
        ValidateReply, WriteConcern, WriteReply,
    };
    use crate::sim::SimCluster;
    use serde_json::json;

    /// Reports only the newest `keep` oplog entries of the wrapped member.
    struct ShortOplog {
        inner: Arc<dyn NodeConnection>,
        keep: usize,
    }

    impl NodeConnection for ShortOplog {
        fn host(&self) -> &str {
            self.inner.host()
        }
        fn is_master(&self) -> CommandResult<IsMasterReply> {
            self.inner.is_master()
        }
        fn repl_set_get_status(&self) -> CommandResult<ReplSetStatus> {
            self.inner.repl_set_get_status()
        }
        fn repl_set_step_up(&self) -> CommandResult<()> {
            self.inner.repl_set_step_up()
        }
        fn repl_set_step_down(&self, step_down_secs: u64, force: bool) -> CommandResult<()> {
            self.inner.repl_set_step_down(step_down_secs, force)
        }
        fn repl_set_get_rbid(&self) -> CommandResult<i64> {
            self.inner.repl_set_get_rbid()
        }
        fn repl_set_freeze(&self, secs: u64) -> CommandResult<()> {
            self.inner.repl_set_freeze(secs)
        }
        fn server_status(&self) -> CommandResult<ServerStatus> {
            self.inner.server_status()
        }
        fn insert(
            &self,
            ns: &Namespace,
            doc: Document,
            write_concern: &WriteConcern,
        ) -> CommandResult<WriteReply> {
            self.inner.insert(ns, doc, write_concern)
        }
        fn create_collection(
            &self,
            ns: &Namespace,
            options: CollectionOptions,
        ) -> CommandResult<WriteReply> {
            self.inner.create_collection(ns, options)
        }
        fn drop_collection(&self, ns: &Namespace) -> CommandResult<WriteReply> {
            self.inner.drop_collection(ns)
        }
        fn list_databases(&self) -> CommandResult<Vec<String>> {
            self.inner.list_databases()
        }
        fn list_collections(&self, db: &str) -> CommandResult<Vec<CollectionInfo>> {
            self.inner.list_collections(db)
        }
        fn count(&self, ns: &Namespace) -> CommandResult<u64> {
            self.inner.count(ns)
        }
        fn find_all(&self, ns: &Namespace) -> CommandResult<Vec<Document>> {
            self.inner.find_all(ns)
        }
        fn db_hash(&self, db: &str) -> CommandResult<DbHashReply> {
            self.inner.db_hash(db)
        }
        fn validate(&self, ns: &Namespace) -> CommandResult<ValidateReply> {
            self.inner.validate(ns)
        }
        fn oplog(&self) -> CommandResult<Vec<OplogEntry>> {
            let oplog = self.inner.oplog()?;
            let skip = oplog.len().saturating_sub(self.keep);
            Ok(oplog.into_iter().skip(skip).collect())
        }
        fn drop_pending_collections(&self) -> CommandResult<Vec<Namespace>> {
            self.inner.drop_pending_collections()
        }
    }

    fn replicated(name: &str) -> SimCluster {
        let sim = SimCluster::standard(name);
        let primary = sim.connect(NodeId(0)).unwrap();
        for i in 0..3 {
            primary
                .insert(&Namespace::new("test", "c"), json!({"_id": i}), &WriteConcern::majority(1000))
                .unwrap();
        }
        sim
    }

    fn members(sim: &SimCluster, keep: Option<usize>) -> Vec<NodeHandle> {
        let reference = NodeHandle::new(NodeId(0), sim.connect(NodeId(0)).unwrap(), MemberState::Primary);
        let inner = sim.connect(NodeId(1)).unwrap();
        let conn: Arc<dyn NodeConnection> = match keep {
            Some(keep) => Arc::new(ShortOplog { inner, keep }),
            None => inner,
        };
        vec![reference, NodeHandle::new(NodeId(1), conn, MemberState::Secondary)]
    }

    // =========================================================================
    // Oplog Comparison
    // =========================================================================

    #[test]
    fn test_matching_oplogs_pass() {
        let sim = replicated("oplog_match");
        let mut report = ConsistencyReport::default();
        check_oplogs(&members(&sim, None), &mut report).unwrap();
        assert!(report.is_empty(), "{}", report);
    }

    #[test]
    fn test_truncated_history_is_tolerated() {
        let sim = replicated("oplog_truncated");
        let mut report = ConsistencyReport::default();
        check_oplogs(&members(&sim, Some(1)), &mut report).unwrap();
        assert!(report.is_empty(), "{}", report);
    }

    #[test]
    fn test_empty_oplog_against_nonempty_is_reported() {
        let sim = replicated("oplog_empty");
        let nodes = members(&sim, Some(0));
        assert!(!nodes[0].conn().oplog().unwrap().is_empty());
        assert!(nodes[1].conn().oplog().unwrap().is_empty());

        let mut report = ConsistencyReport::default();
        check_oplogs(&nodes, &mut report).unwrap();
        assert_eq!(report.len(), 1);
        match &report.mismatches[0] {
            Mismatch::Oplog {
                position,
                member_entry,
                ..
            } => {
                assert_eq!(*position, 0);
                assert_eq!(member_entry, NO_ENTRY);
            }
            other => panic!("unexpected mismatch {}", other),
        }
    }

    #[test]
    fn test_both_empty_pass() {
        assert!(first_difference(&[], &[]).is_none());
    }
}
