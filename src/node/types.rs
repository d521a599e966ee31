//! Request and reply shapes of the administrative command surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::role::{MemberState, NodeId};

/// A replicated document. Always carries an `_id` once stored.
pub type Document = Value;

/// `<db>.<collection>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            coll: coll.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.coll)
    }
}

/// Position in the oplog.
///
/// Ordered by term first, then timestamp, matching how members decide
/// which history is newer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpTime {
    pub term: u64,
    pub ts: u64,
}

impl OpTime {
    pub fn new(term: u64, ts: u64) -> Self {
        Self { term, ts }
    }
}

impl fmt::Display for OpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ts: {}, t: {}}}", self.ts, self.term)
    }
}

/// Replicated operation recorded in the oplog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Insert { ns: Namespace, doc: Document },
    CreateCollection { ns: Namespace, capped_max: Option<usize> },
    DropCollection { ns: Namespace },
    Noop { msg: String },
}

/// One entry of `local.oplog.rs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OplogEntry {
    pub op_time: OpTime,
    #[serde(flatten)]
    pub op: Operation,
}

/// `isMaster` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsMasterReply {
    pub host: String,
    pub ismaster: bool,
    pub secondary: bool,
    pub arbiter_only: bool,
    pub state: MemberState,
}

impl IsMasterReply {
    /// Role the member reports for itself.
    pub fn role(&self) -> MemberState {
        self.state
    }
}

/// Per-member entry of `replSetGetStatus`, from the answering member's view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatus {
    pub id: NodeId,
    pub host: String,
    pub state: MemberState,
    pub optime: Option<OpTime>,
}

/// `replSetGetStatus` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplSetStatus {
    pub set: String,
    pub term: u64,
    pub my_state: MemberState,
    pub applied_op_time: OpTime,
    pub members: Vec<MemberStatus>,
}

/// Acknowledgement level of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acknowledgement {
    Nodes(u32),
    Majority,
}

/// Write concern attached to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern {
    pub w: Acknowledgement,
    pub j: bool,
    pub wtimeout_ms: u64,
}

impl WriteConcern {
    /// Acknowledged by the primary only.
    pub fn w1() -> Self {
        Self {
            w: Acknowledgement::Nodes(1),
            j: false,
            wtimeout_ms: 0,
        }
    }

    /// Acknowledged by the primary and journaled.
    pub fn journaled() -> Self {
        Self {
            j: true,
            ..Self::w1()
        }
    }

    /// Acknowledged by a majority of data-bearing voters.
    pub fn majority(wtimeout_ms: u64) -> Self {
        Self {
            w: Acknowledgement::Majority,
            j: false,
            wtimeout_ms,
        }
    }

    /// Acknowledged by `n` members.
    pub fn nodes(n: u32, wtimeout_ms: u64) -> Self {
        Self {
            w: Acknowledgement::Nodes(n),
            j: false,
            wtimeout_ms,
        }
    }
}

/// Reply to a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReply {
    pub n: u64,
    pub op_time: OpTime,
}

/// Collection listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub capped: bool,
}

/// `dbHash` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbHashReply {
    /// Digest over every collection in the database
    pub md5: String,
    /// Digest per collection
    pub collections: BTreeMap<String, String>,
    /// Names of capped collections in the database
    pub capped: Vec<String>,
}

/// `validate` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateReply {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Subset of `serverStatus` the harness consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub storage_engine: String,
    pub supports_committed_reads: bool,
}

/// Options for creating a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOptions {
    /// Maximum number of documents when the collection is capped
    pub capped_max: Option<usize>,
}

impl CollectionOptions {
    pub fn capped(max: usize) -> Self {
        Self {
            capped_max: Some(max),
        }
    }
}
