//! Mismatch reports.

use std::fmt;

use serde::Serialize;

use crate::node::Document;

/// Documents present on only one side of a collection comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionDiff {
    pub only_on_reference: Vec<Document>,
    pub only_on_member: Vec<Document>,
}

impl CollectionDiff {
    /// Multiset difference of two document lists; order is ignored.
    pub fn between(reference: &[Document], member: &[Document]) -> Self {
        let mut remaining: Vec<&Document> = member.iter().collect();
        let mut only_on_reference = Vec::new();
        for doc in reference {
            match remaining.iter().position(|d| *d == doc) {
                Some(pos) => {
                    remaining.swap_remove(pos);
                }
                None => only_on_reference.push(doc.clone()),
            }
        }
        Self {
            only_on_reference,
            only_on_member: remaining.into_iter().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.only_on_reference.is_empty() && self.only_on_member.is_empty()
    }
}

/// One disagreement between the reference member and another member.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mismatch {
    Oplog {
        reference: String,
        member: String,
        /// Distance from the newest entry
        position: usize,
        reference_entry: String,
        member_entry: String,
    },
    Count {
        reference: String,
        member: String,
        ns: String,
        reference_count: u64,
        member_count: u64,
    },
    DatabaseSet {
        reference: String,
        member: String,
        reference_dbs: Vec<String>,
        member_dbs: Vec<String>,
    },
    CollectionHash {
        reference: String,
        member: String,
        db: String,
        collection: String,
        diff: CollectionDiff,
    },
    DatabaseHash {
        reference: String,
        member: String,
        db: String,
        reference_md5: String,
        member_md5: String,
    },
    Validation {
        member: String,
        ns: String,
        errors: Vec<String>,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oplog {
                reference,
                member,
                position,
                reference_entry,
                member_entry,
            } => write!(
                f,
                "oplog of {} differs from {} at {} entries from the top: {} vs {}",
                member, reference, position, member_entry, reference_entry
            ),
            Self::Count {
                reference,
                member,
                ns,
                reference_count,
                member_count,
            } => write!(
                f,
                "{} has {} documents on {} but {} on {}",
                ns, member_count, member, reference_count, reference
            ),
            Self::DatabaseSet {
                reference,
                member,
                reference_dbs,
                member_dbs,
            } => write!(
                f,
                "{} has databases {:?} but {} has {:?}",
                member, member_dbs, reference, reference_dbs
            ),
            Self::CollectionHash {
                reference,
                member,
                db,
                collection,
                diff,
            } => {
                write!(
                    f,
                    "collection {}.{} differs between {} and {}",
                    db, collection, reference, member
                )?;
                if !diff.only_on_reference.is_empty() {
                    write!(f, "; only on {}: ", reference)?;
                    write_docs(f, &diff.only_on_reference)?;
                }
                if !diff.only_on_member.is_empty() {
                    write!(f, "; only on {}: ", member)?;
                    write_docs(f, &diff.only_on_member)?;
                }
                Ok(())
            }
            Self::DatabaseHash {
                reference,
                member,
                db,
                reference_md5,
                member_md5,
            } => write!(
                f,
                "database {} hashes to {} on {} but {} on {}",
                db, member_md5, member, reference_md5, reference
            ),
            Self::Validation { member, ns, errors } => {
                write!(f, "{} failed validation on {}: {}", ns, member, errors.join(", "))
            }
        }
    }
}

fn write_docs(f: &mut fmt::Formatter<'_>, docs: &[Document]) -> fmt::Result {
    let rendered: Vec<String> = docs.iter().map(|d| d.to_string()).collect();
    write!(f, "[{}]", rendered.join(", "))
}

/// Everything one consistency check found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub mismatches: Vec<Mismatch>,
}

impl ConsistencyReport {
    pub fn push(&mut self, mismatch: Mismatch) {
        self.mismatches.push(mismatch);
    }

    pub fn is_empty(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mismatches.len()
    }

    /// Collection-level diffs, for callers that want the documents.
    pub fn collection_diffs(&self) -> impl Iterator<Item = (&str, &str, &CollectionDiff)> {
        self.mismatches.iter().filter_map(|m| match m {
            Mismatch::CollectionHash {
                db,
                collection,
                diff,
                ..
            } => Some((db.as_str(), collection.as_str(), diff)),
            _ => None,
        })
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mismatch(es)", self.mismatches.len())?;
        for mismatch in &self.mismatches {
            write!(f, "\n  - {}", mismatch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_ignores_order() {
        let a = vec![json!({"_id": 1}), json!({"_id": 2})];
        let b = vec![json!({"_id": 2}), json!({"_id": 1})];
        assert!(CollectionDiff::between(&a, &b).is_empty());
    }

    #[test]
    fn test_diff_names_both_sides() {
        let a = vec![json!({"_id": 1}), json!({"_id": 2})];
        let b = vec![json!({"_id": 2}), json!({"_id": 3})];
        let diff = CollectionDiff::between(&a, &b);
        assert_eq!(diff.only_on_reference, vec![json!({"_id": 1})]);
        assert_eq!(diff.only_on_member, vec![json!({"_id": 3})]);
    }

    #[test]
    fn test_diff_counts_duplicates() {
        let a = vec![json!({"x": 1}), json!({"x": 1})];
        let b = vec![json!({"x": 1})];
        let diff = CollectionDiff::between(&a, &b);
        assert_eq!(diff.only_on_reference, vec![json!({"x": 1})]);
        assert!(diff.only_on_member.is_empty());
    }

    #[test]
    fn test_report_display_lists_documents() {
        let mut report = ConsistencyReport::default();
        report.push(Mismatch::CollectionHash {
            reference: "a:1".into(),
            member: "b:2".into(),
            db: "test".into(),
            collection: "c".into(),
            diff: CollectionDiff {
                only_on_reference: vec![],
                only_on_member: vec![json!({"_id": "stray"})],
            },
        });
        let text = report.to_string();
        assert!(text.starts_with("1 mismatch(es)"));
        assert!(text.contains("test.c"));
        assert!(text.contains("only on b:2"));
        assert!(text.contains("stray"));
        assert_eq!(report.collection_diffs().count(), 1);
    }

    #[test]
    fn test_report_serializes_tagged() {
        let mismatch = Mismatch::Validation {
            member: "a:1".into(),
            ns: "test.c".into(),
            errors: vec!["bad".into()],
        };
        let value = serde_json::to_value(&mismatch).unwrap();
        assert_eq!(value["type"], "validation");
    }
}
