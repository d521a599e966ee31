//! `NodeConnection` onto one member of a simulated set.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::world::World;
use crate::node::{
    CollectionInfo, CollectionOptions, CommandResult, DbHashReply, Document, IsMasterReply,
    Namespace, NodeConnection, NodeId, OplogEntry, ReplSetStatus, ServerStatus, ValidateReply,
    WriteConcern, WriteReply,
};

pub(crate) struct SimConnection {
    id: NodeId,
    host: String,
    world: Arc<Mutex<World>>,
}

impl SimConnection {
    pub(crate) fn new(id: NodeId, host: String, world: Arc<Mutex<World>>) -> Self {
        Self { id, host, world }
    }

    /// Lock the world and let it catch up before answering.
    fn world(&self) -> MutexGuard<'_, World> {
        let mut world = self.world.lock().unwrap_or_else(PoisonError::into_inner);
        world.pump();
        world
    }
}

impl NodeConnection for SimConnection {
    fn host(&self) -> &str {
        &self.host
    }

    fn is_master(&self) -> CommandResult<IsMasterReply> {
        self.world().is_master(self.id)
    }

    fn repl_set_get_status(&self) -> CommandResult<ReplSetStatus> {
        self.world().status(self.id)
    }

    fn repl_set_step_up(&self) -> CommandResult<()> {
        self.world().step_up(self.id)
    }

    fn repl_set_step_down(&self, _step_down_secs: u64, force: bool) -> CommandResult<()> {
        self.world().step_down(self.id, force)
    }

    fn repl_set_get_rbid(&self) -> CommandResult<i64> {
        self.world().rbid(self.id)
    }

    fn repl_set_freeze(&self, secs: u64) -> CommandResult<()> {
        self.world().freeze(self.id, secs)
    }

    fn server_status(&self) -> CommandResult<ServerStatus> {
        self.world().server_status(self.id)
    }

    fn insert(
        &self,
        ns: &Namespace,
        doc: Document,
        write_concern: &WriteConcern,
    ) -> CommandResult<WriteReply> {
        self.world().insert(self.id, ns, doc, write_concern)
    }

    fn create_collection(
        &self,
        ns: &Namespace,
        options: CollectionOptions,
    ) -> CommandResult<WriteReply> {
        self.world().create_collection(self.id, ns, options)
    }

    fn drop_collection(&self, ns: &Namespace) -> CommandResult<WriteReply> {
        self.world().drop_collection(self.id, ns)
    }

    fn list_databases(&self) -> CommandResult<Vec<String>> {
        self.world().list_databases(self.id)
    }

    fn list_collections(&self, db: &str) -> CommandResult<Vec<CollectionInfo>> {
        self.world().list_collections(self.id, db)
    }

    fn count(&self, ns: &Namespace) -> CommandResult<u64> {
        Ok(self.world().find_all(self.id, ns)?.len() as u64)
    }

    fn find_all(&self, ns: &Namespace) -> CommandResult<Vec<Document>> {
        self.world().find_all(self.id, ns)
    }

    fn db_hash(&self, db: &str) -> CommandResult<DbHashReply> {
        self.world().db_hash(self.id, db)
    }

    fn validate(&self, ns: &Namespace) -> CommandResult<ValidateReply> {
        self.world().validate(self.id, ns)
    }

    fn oplog(&self) -> CommandResult<Vec<OplogEntry>> {
        self.world().oplog(self.id)
    }

    fn drop_pending_collections(&self) -> CommandResult<Vec<Namespace>> {
        self.world().drop_pending(self.id)
    }
}
