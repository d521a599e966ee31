//! Node handles and the command surface they speak.

use std::fmt;
use std::sync::Arc;

use super::errors::CommandResult;
use super::role::{MemberState, NodeId};
use super::types::{
    CollectionInfo, CollectionOptions, DbHashReply, Document, IsMasterReply, Namespace, OpTime,
    OplogEntry, ReplSetStatus, ServerStatus, ValidateReply, WriteConcern, WriteReply,
};

/// Administrative command surface of one member.
///
/// Implementations are either a real client speaking to a server or an
/// in-memory model (see `crate::sim`). Every call is a single
/// request/response exchange; none of them block on replication except
/// where the write concern says so.
pub trait NodeConnection: Send + Sync {
    /// `host:port` of the member.
    fn host(&self) -> &str;

    fn is_master(&self) -> CommandResult<IsMasterReply>;

    fn repl_set_get_status(&self) -> CommandResult<ReplSetStatus>;

    /// Ask the member to run for election now.
    fn repl_set_step_up(&self) -> CommandResult<()>;

    /// Ask the primary to step down. Non-primaries answer `NotPrimary`.
    fn repl_set_step_down(&self, step_down_secs: u64, force: bool) -> CommandResult<()>;

    fn repl_set_get_rbid(&self) -> CommandResult<i64>;

    /// Suppress election attempts for `secs` seconds; `0` unfreezes.
    fn repl_set_freeze(&self, secs: u64) -> CommandResult<()>;

    fn server_status(&self) -> CommandResult<ServerStatus>;

    fn insert(
        &self,
        ns: &Namespace,
        doc: Document,
        write_concern: &WriteConcern,
    ) -> CommandResult<WriteReply>;

    fn create_collection(
        &self,
        ns: &Namespace,
        options: CollectionOptions,
    ) -> CommandResult<WriteReply>;

    fn drop_collection(&self, ns: &Namespace) -> CommandResult<WriteReply>;

    /// User databases, excluding `local`.
    fn list_databases(&self) -> CommandResult<Vec<String>>;

    fn list_collections(&self, db: &str) -> CommandResult<Vec<CollectionInfo>>;

    fn count(&self, ns: &Namespace) -> CommandResult<u64>;

    /// Every document of a collection in natural order.
    fn find_all(&self, ns: &Namespace) -> CommandResult<Vec<Document>>;

    fn db_hash(&self, db: &str) -> CommandResult<DbHashReply>;

    fn validate(&self, ns: &Namespace) -> CommandResult<ValidateReply>;

    /// Full oplog, oldest entry first.
    fn oplog(&self) -> CommandResult<Vec<OplogEntry>>;

    /// Newest oplog entry.
    fn oplog_top(&self) -> CommandResult<Option<OplogEntry>> {
        Ok(self.oplog()?.pop())
    }

    /// Collections whose two-phase drop has not finished yet.
    fn drop_pending_collections(&self) -> CommandResult<Vec<Namespace>>;
}

/// One addressable member plus the role it was last observed in.
///
/// The role is only updated by code that has just observed it
/// (`refresh_role`) or has just caused it (`observe_role`).
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    host: String,
    conn: Arc<dyn NodeConnection>,
    role: MemberState,
}

impl NodeHandle {
    pub fn new(id: NodeId, conn: Arc<dyn NodeConnection>, role: MemberState) -> Self {
        Self {
            id,
            host: conn.host().to_string(),
            conn,
            role,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Role as of the last observation.
    pub fn role(&self) -> MemberState {
        self.role
    }

    /// Underlying command connection.
    pub fn conn(&self) -> &dyn NodeConnection {
        self.conn.as_ref()
    }

    /// Insert with `w: 1`.
    pub fn insert_one(&self, ns: &Namespace, doc: Document) -> CommandResult<WriteReply> {
        self.conn.insert(ns, doc, &WriteConcern::w1())
    }

    /// Ask the member for its role and record the answer.
    ///
    /// A network failure records `Unreachable` and still returns the error.
    pub(crate) fn refresh_role(&mut self) -> CommandResult<MemberState> {
        match self.conn.is_master() {
            Ok(reply) => {
                self.role = reply.role();
                Ok(self.role)
            }
            Err(err) => {
                if err.is_network_error() {
                    self.role = MemberState::Unreachable;
                }
                Err(err)
            }
        }
    }

    pub(crate) fn observe_role(&mut self, role: MemberState) {
        self.role = role;
    }

    /// Applied optime as reported by the member itself.
    pub(crate) fn applied_op_time(&self) -> CommandResult<OpTime> {
        Ok(self.conn.repl_set_get_status()?.applied_op_time)
    }

    /// Whether the member answers as an arbiter.
    pub(crate) fn is_arbiter(&self) -> CommandResult<bool> {
        Ok(self.conn.is_master()?.arbiter_only)
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("role", &self.role)
            .finish()
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.host == other.host
    }
}
