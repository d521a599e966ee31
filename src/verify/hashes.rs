//! Per-database content hashes.
//!
//! Databases holding a capped collection are compared collection by
//! collection over their non-capped collections only; capped collections
//! can legitimately differ in content across members. Every other
//! database must hash identically. Any difference is resolved down to
//! the documents present on one side only.

use std::collections::BTreeSet;

use super::report::{CollectionDiff, ConsistencyReport, Mismatch};
use crate::harness::HarnessResult;
use crate::node::{DbHashReply, Namespace, NodeHandle};

/// Database holding only member-local state.
const LOCAL_DB: &str = "local";

pub(crate) fn replicated_dbs(node: &NodeHandle) -> HarnessResult<Vec<String>> {
    let mut dbs: Vec<String> = node
        .conn()
        .list_databases()?
        .into_iter()
        .filter(|db| db != LOCAL_DB)
        .collect();
    dbs.sort();
    Ok(dbs)
}

pub(crate) fn check_replicated_data_hashes(
    members: &[NodeHandle],
    report: &mut ConsistencyReport,
) -> HarnessResult<()> {
    let Some((reference, rest)) = members.split_first() else {
        return Ok(());
    };
    let reference_dbs = replicated_dbs(reference)?;

    for member in rest {
        let member_dbs = replicated_dbs(member)?;
        if member_dbs != reference_dbs {
            report.push(Mismatch::DatabaseSet {
                reference: reference.host().to_string(),
                member: member.host().to_string(),
                reference_dbs: reference_dbs.clone(),
                member_dbs: member_dbs.clone(),
            });
        }

        let all_dbs: BTreeSet<&String> = reference_dbs.iter().chain(member_dbs.iter()).collect();
        for db in all_dbs {
            compare_db(reference, member, db, report)?;
        }
    }
    Ok(())
}

fn compare_db(
    reference: &NodeHandle,
    member: &NodeHandle,
    db: &str,
    report: &mut ConsistencyReport,
) -> HarnessResult<()> {
    let expected = reference.conn().db_hash(db)?;
    let actual = member.conn().db_hash(db)?;
    if expected.md5 == actual.md5 {
        return Ok(());
    }

    let has_capped = !expected.capped.is_empty() || !actual.capped.is_empty();
    let names = collection_names(&expected, &actual, has_capped);

    let mut found = false;
    for name in names {
        if expected.collections.get(&name) == actual.collections.get(&name) {
            continue;
        }
        let ns = Namespace::new(db, name.as_str());
        let diff = CollectionDiff::between(
            &reference.conn().find_all(&ns)?,
            &member.conn().find_all(&ns)?,
        );
        report.push(Mismatch::CollectionHash {
            reference: reference.host().to_string(),
            member: member.host().to_string(),
            db: db.to_string(),
            collection: name,
            diff,
        });
        found = true;
    }

    if !found && !has_capped {
        report.push(Mismatch::DatabaseHash {
            reference: reference.host().to_string(),
            member: member.host().to_string(),
            db: db.to_string(),
            reference_md5: expected.md5,
            member_md5: actual.md5,
        });
    }
    Ok(())
}

/// Collections to compare, skipping anything capped on either side.
fn collection_names(expected: &DbHashReply, actual: &DbHashReply, skip_capped: bool) -> Vec<String> {
    let capped: BTreeSet<&String> = expected.capped.iter().chain(actual.capped.iter()).collect();
    let names: BTreeSet<&String> = expected
        .collections
        .keys()
        .chain(actual.collections.keys())
        .filter(|name| !(skip_capped && capped.contains(name)))
        .collect();
    names.into_iter().cloned().collect()
}
