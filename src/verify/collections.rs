//! Collection-level checks: drop barrier, counts, validation.

use std::collections::BTreeSet;

use super::hashes::replicated_dbs;
use super::report::{ConsistencyReport, Mismatch};
use crate::harness::{wait_until, HarnessResult, WaitConfig};
use crate::node::{Namespace, NodeHandle};

/// Wait until no member has a collection drop in progress.
pub(crate) fn await_drop_pending(members: &[NodeHandle], wait: &WaitConfig) -> HarnessResult<()> {
    wait_until("two-phase collection drops to finish", wait, || {
        for member in members {
            if !member.conn().drop_pending_collections()?.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    })
}

fn namespaces(member: &NodeHandle) -> HarnessResult<BTreeSet<Namespace>> {
    let mut all = BTreeSet::new();
    for db in replicated_dbs(member)? {
        for info in member.conn().list_collections(&db)? {
            all.insert(Namespace::new(db.as_str(), info.name));
        }
    }
    Ok(all)
}

pub(crate) fn check_counts(members: &[NodeHandle], report: &mut ConsistencyReport) -> HarnessResult<()> {
    let Some((reference, rest)) = members.split_first() else {
        return Ok(());
    };

    for member in rest {
        let mut all = namespaces(reference)?;
        all.extend(namespaces(member)?);
        for ns in all {
            let reference_count = reference.conn().count(&ns)?;
            let member_count = member.conn().count(&ns)?;
            if reference_count != member_count {
                report.push(Mismatch::Count {
                    reference: reference.host().to_string(),
                    member: member.host().to_string(),
                    ns: ns.to_string(),
                    reference_count,
                    member_count,
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_collections(
    members: &[NodeHandle],
    report: &mut ConsistencyReport,
) -> HarnessResult<()> {
    for member in members {
        for ns in namespaces(member)? {
            let reply = member.conn().validate(&ns)?;
            if !reply.valid {
                report.push(Mismatch::Validation {
                    member: member.host().to_string(),
                    ns: ns.to_string(),
                    errors: reply.errors,
                });
            }
        }
    }
    Ok(())
}
