//! Shared state of a simulated replica set.
//!
//! There are no background threads. Replication, term propagation, step
//! down on lost majority, rollback and two-phase drop reaping all advance
//! in `World::pump`, which every command runs before answering. A set
//! that nobody talks to does not make progress, which is what makes the
//! model deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cluster::{ReplSetConfig, ShutdownSignal};
use crate::fabric::LinkTable;
use crate::node::{
    Acknowledgement, CollectionInfo, CollectionOptions, CommandError, CommandResult, DbHashReply,
    Document, IsMasterReply, MemberState, MemberStatus, Namespace, NodeId, OpTime, OplogEntry,
    Operation, ReplSetStatus, ServerStatus, ValidateReply, WriteConcern, WriteReply,
};

/// Pumps a dropped collection stays drop-pending.
const DROP_PENDING_PUMPS: u32 = 2;

/// Extra pumps a write waits for its write concern.
const WRITE_CONCERN_PUMPS: usize = 4;

/// Storage engine the simulated members report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProfile {
    #[serde(default = "default_engine")]
    pub storage_engine: String,
    #[serde(default = "default_committed_reads")]
    pub supports_committed_reads: bool,
}

fn default_engine() -> String {
    "wiredTiger".to_string()
}

fn default_committed_reads() -> bool {
    true
}

impl Default for StorageProfile {
    fn default() -> Self {
        Self {
            storage_engine: default_engine(),
            supports_committed_reads: default_committed_reads(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimState {
    Primary { elected_in: u64 },
    Secondary,
    Arbiter,
    Rollback,
    Down,
}

#[derive(Debug, Clone)]
struct SimCollection {
    capped_max: Option<usize>,
    docs: Vec<Document>,
}

impl SimCollection {
    fn new(capped_max: Option<usize>) -> Self {
        Self {
            capped_max,
            docs: Vec::new(),
        }
    }

    fn contains_id(&self, id: &Value) -> bool {
        self.docs.iter().any(|d| d.get("_id") == Some(id))
    }

    fn push(&mut self, doc: Document) {
        self.docs.push(doc);
        if let Some(max) = self.capped_max {
            while self.docs.len() > max {
                self.docs.remove(0);
            }
        }
    }

    /// Natural order for capped collections, `_id` order otherwise.
    fn hash(&self) -> String {
        let mut docs: Vec<&Document> = self.docs.iter().collect();
        if self.capped_max.is_none() {
            docs.sort_by_key(|d| id_key(d));
        }
        let mut hasher = Sha256::new();
        for doc in docs {
            hasher.update(doc.to_string().as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

fn id_key(doc: &Document) -> String {
    doc.get("_id").map(|v| v.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone)]
struct PendingDrop {
    ns: Namespace,
    remaining: u32,
}

type Databases = BTreeMap<String, BTreeMap<String, SimCollection>>;

#[derive(Debug, Clone)]
struct SimNode {
    id: NodeId,
    host: String,
    arbiter: bool,
    state: SimState,
    term: u64,
    oplog: Vec<OplogEntry>,
    data: Databases,
    rbid: i64,
    frozen: bool,
    history_floor: usize,
    pending_drops: Vec<PendingDrop>,
    unrecoverable: Option<String>,
}

impl SimNode {
    fn is_up(&self) -> bool {
        self.state != SimState::Down && self.unrecoverable.is_none()
    }

    fn is_primary(&self) -> bool {
        matches!(self.state, SimState::Primary { .. })
    }

    fn member_state(&self) -> MemberState {
        match self.state {
            SimState::Primary { .. } => MemberState::Primary,
            SimState::Secondary => MemberState::Secondary,
            SimState::Arbiter => MemberState::Arbiter,
            SimState::Rollback => MemberState::Rollback,
            SimState::Down => MemberState::Unreachable,
        }
    }

    fn last_op_time(&self) -> OpTime {
        self.oplog.last().map(|e| e.op_time).unwrap_or_default()
    }

    fn apply(&mut self, entry: &OplogEntry, track_drops: bool) {
        match &entry.op {
            Operation::Insert { ns, doc } => {
                self.data
                    .entry(ns.db.clone())
                    .or_default()
                    .entry(ns.coll.clone())
                    .or_insert_with(|| SimCollection::new(None))
                    .push(doc.clone());
            }
            Operation::CreateCollection { ns, capped_max } => {
                self.data
                    .entry(ns.db.clone())
                    .or_default()
                    .entry(ns.coll.clone())
                    .or_insert_with(|| SimCollection::new(*capped_max));
            }
            Operation::DropCollection { ns } => {
                if let Some(colls) = self.data.get_mut(&ns.db) {
                    colls.remove(&ns.coll);
                    if colls.is_empty() {
                        self.data.remove(&ns.db);
                    }
                }
                if track_drops {
                    self.pending_drops.push(PendingDrop {
                        ns: ns.clone(),
                        remaining: DROP_PENDING_PUMPS,
                    });
                }
            }
            Operation::Noop { .. } => {}
        }
    }

    /// Rebuild data from the oplog alone.
    fn rebuild(&mut self) {
        self.data.clear();
        self.pending_drops.clear();
        let entries = std::mem::take(&mut self.oplog);
        for entry in &entries {
            self.apply(entry, false);
        }
        self.oplog = entries;
    }

    fn reap_drops(&mut self) {
        for drop in &mut self.pending_drops {
            drop.remaining = drop.remaining.saturating_sub(1);
        }
        self.pending_drops.retain(|d| d.remaining > 0);
    }

    fn collection(&self, ns: &Namespace) -> Option<&SimCollection> {
        self.data.get(&ns.db).and_then(|c| c.get(&ns.coll))
    }
}

fn common_prefix(a: &[OplogEntry], b: &[OplogEntry]) -> usize {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x.op_time == y.op_time)
        .count()
}

/// The whole simulated set.
pub(crate) struct World {
    config: ReplSetConfig,
    nodes: Vec<SimNode>,
    pub(crate) links: LinkTable,
    clock: u64,
    storage: StorageProfile,
}

impl World {
    /// Start every member and initiate the set with the first data-bearing
    /// member as primary in term 1.
    pub(crate) fn initiate(config: ReplSetConfig, storage: StorageProfile) -> Self {
        let nodes = config
            .members
            .iter()
            .map(|m| SimNode {
                id: m.id,
                host: m.host.clone(),
                arbiter: m.arbiter_only,
                state: if m.arbiter_only {
                    SimState::Arbiter
                } else {
                    SimState::Secondary
                },
                term: 1,
                oplog: Vec::new(),
                data: Databases::new(),
                rbid: 0,
                frozen: false,
                history_floor: 0,
                pending_drops: Vec::new(),
                unrecoverable: None,
            })
            .collect();
        let links = LinkTable::new(config.members.iter().map(|m| m.id));

        let mut world = Self {
            config,
            nodes,
            links,
            clock: 0,
            storage,
        };

        if let Some(first) = world.nodes.iter().position(|n| !n.arbiter) {
            world.nodes[first].state = SimState::Primary { elected_in: 1 };
            world.append(
                first,
                Operation::Noop {
                    msg: "initiating set".to_string(),
                },
            );
            world.pump();
        }
        world
    }

    pub(crate) fn config(&self) -> &ReplSetConfig {
        &self.config
    }

    pub(crate) fn host(&self, id: NodeId) -> String {
        self.nodes
            .get(id.index())
            .map(|n| n.host.clone())
            .unwrap_or_default()
    }

    fn majority(&self) -> usize {
        self.nodes.len() / 2 + 1
    }

    /// Majority of voters, capped by the number of data-bearing members.
    fn write_majority(&self) -> usize {
        let data_bearing = self.nodes.iter().filter(|n| !n.arbiter).count();
        self.majority().min(data_bearing)
    }

    fn reachable(&self, a: usize, b: usize) -> bool {
        self.links.is_reachable(self.nodes[a].id, self.nodes[b].id)
    }

    fn index(&self, id: NodeId) -> CommandResult<usize> {
        if id.index() < self.nodes.len() {
            Ok(id.index())
        } else {
            Err(CommandError::network(id.to_string(), "no such member"))
        }
    }

    /// Resolve a member that must be up to answer commands.
    fn up(&self, id: NodeId) -> CommandResult<usize> {
        let i = self.index(id)?;
        let node = &self.nodes[i];
        if let Some(reason) = &node.unrecoverable {
            return Err(CommandError::UnrecoverableRollback(reason.clone()));
        }
        if node.state == SimState::Down {
            return Err(CommandError::network(node.host.clone(), "connection refused"));
        }
        Ok(i)
    }

    /// Resolve a member that must hold data.
    fn data_node(&self, id: NodeId) -> CommandResult<usize> {
        let i = self.up(id)?;
        if self.nodes[i].arbiter {
            return Err(CommandError::InvalidOperation(format!(
                "{} is an arbiter and holds no data",
                self.nodes[i].host
            )));
        }
        Ok(i)
    }

    fn primary_index(&self, id: NodeId) -> CommandResult<usize> {
        let i = self.up(id)?;
        if !self.nodes[i].is_primary() {
            return Err(CommandError::NotPrimary);
        }
        Ok(i)
    }

    // =========================================================================
    // BACKGROUND PROGRESS
    // =========================================================================

    pub(crate) fn pump(&mut self) {
        self.propagate_terms();
        self.resolve_primaries();
        for i in 0..self.nodes.len() {
            self.replicate(i);
        }
        for node in &mut self.nodes {
            node.reap_drops();
        }
    }

    fn propagate_terms(&mut self) {
        let n = self.nodes.len();
        for _ in 0..n {
            for a in 0..n {
                for b in (a + 1)..n {
                    if !(self.nodes[a].is_up() && self.nodes[b].is_up() && self.reachable(a, b)) {
                        continue;
                    }
                    let term = self.nodes[a].term.max(self.nodes[b].term);
                    self.nodes[a].term = term;
                    self.nodes[b].term = term;
                }
            }
        }
    }

    /// Primaries step down on a newer term or a lost majority.
    fn resolve_primaries(&mut self) {
        let majority = self.majority();
        for i in 0..self.nodes.len() {
            let elected_in = match self.nodes[i].state {
                SimState::Primary { elected_in } if self.nodes[i].is_up() => elected_in,
                _ => continue,
            };
            let visible = (0..self.nodes.len())
                .filter(|&j| self.nodes[j].is_up() && self.reachable(i, j))
                .count();
            if self.nodes[i].term > elected_in || visible < majority {
                self.nodes[i].state = SimState::Secondary;
            }
        }
    }

    fn sync_source(&self, i: usize) -> Option<usize> {
        (0..self.nodes.len()).find(|&j| {
            j != i && self.nodes[j].is_up() && self.nodes[j].is_primary() && self.reachable(i, j)
        })
    }

    fn replicate(&mut self, i: usize) {
        {
            let node = &self.nodes[i];
            if node.arbiter
                || !node.is_up()
                || !matches!(node.state, SimState::Secondary | SimState::Rollback)
            {
                return;
            }
        }
        let Some(src) = self.sync_source(i) else {
            return;
        };

        if self.nodes[i].state == SimState::Rollback {
            self.nodes[i].state = SimState::Secondary;
        }

        let common = common_prefix(&self.nodes[i].oplog, &self.nodes[src].oplog);
        if common == self.nodes[i].oplog.len() {
            let missing: Vec<OplogEntry> = self.nodes[src].oplog[common..].to_vec();
            let node = &mut self.nodes[i];
            for entry in missing {
                node.apply(&entry, true);
                node.oplog.push(entry);
            }
            return;
        }

        if common < self.nodes[src].history_floor {
            let reason = format!(
                "sync source {} no longer has the oplog entry at position {} needed to roll back",
                self.nodes[src].host, common
            );
            self.nodes[i].unrecoverable = Some(reason);
            return;
        }

        let node = &mut self.nodes[i];
        node.state = SimState::Rollback;
        node.rbid += 1;
        node.oplog.truncate(common);
        node.rebuild();
    }

    // =========================================================================
    // LOCAL WRITES
    // =========================================================================

    fn append(&mut self, i: usize, op: Operation) -> OpTime {
        self.clock += 1;
        let op_time = OpTime::new(self.nodes[i].term, self.clock);
        let entry = OplogEntry { op_time, op };
        let node = &mut self.nodes[i];
        node.apply(&entry, true);
        node.oplog.push(entry);
        op_time
    }

    fn acknowledged(&self, op_time: OpTime) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.is_up() && !n.arbiter && n.oplog.iter().any(|e| e.op_time == op_time))
            .count()
    }

    fn await_write_concern(&mut self, op_time: OpTime, wc: &WriteConcern) -> CommandResult<()> {
        let needed = match wc.w {
            Acknowledgement::Nodes(n) => n as usize,
            Acknowledgement::Majority => self.write_majority(),
        };
        for _ in 0..WRITE_CONCERN_PUMPS {
            if self.acknowledged(op_time) >= needed {
                return Ok(());
            }
            self.pump();
        }
        let acked = self.acknowledged(op_time);
        if acked >= needed {
            Ok(())
        } else {
            Err(CommandError::WriteConcernFailed(format!(
                "waiting for replication timed out after {}ms: {} of {} members acknowledged",
                wc.wtimeout_ms, acked, needed
            )))
        }
    }

    pub(crate) fn insert(
        &mut self,
        id: NodeId,
        ns: &Namespace,
        doc: Document,
        wc: &WriteConcern,
    ) -> CommandResult<WriteReply> {
        let i = self.primary_index(id)?;
        let Value::Object(mut fields) = doc else {
            return Err(CommandError::InvalidOperation(
                "document must be an object".to_string(),
            ));
        };
        let id_value = fields
            .entry("_id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()))
            .clone();
        if let Some(coll) = self.nodes[i].collection(ns) {
            if coll.contains_id(&id_value) {
                return Err(CommandError::DuplicateKey(format!("{} _id: {}", ns, id_value)));
            }
        }

        let op_time = self.append(
            i,
            Operation::Insert {
                ns: ns.clone(),
                doc: Value::Object(fields),
            },
        );
        self.await_write_concern(op_time, wc)?;
        Ok(WriteReply { n: 1, op_time })
    }

    pub(crate) fn create_collection(
        &mut self,
        id: NodeId,
        ns: &Namespace,
        options: CollectionOptions,
    ) -> CommandResult<WriteReply> {
        let i = self.primary_index(id)?;
        if self.nodes[i].collection(ns).is_some() {
            return Err(CommandError::InvalidOperation(format!(
                "collection {} already exists",
                ns
            )));
        }
        let op_time = self.append(
            i,
            Operation::CreateCollection {
                ns: ns.clone(),
                capped_max: options.capped_max,
            },
        );
        Ok(WriteReply { n: 0, op_time })
    }

    pub(crate) fn drop_collection(&mut self, id: NodeId, ns: &Namespace) -> CommandResult<WriteReply> {
        let i = self.primary_index(id)?;
        if self.nodes[i].collection(ns).is_none() {
            return Err(CommandError::NamespaceNotFound(ns.to_string()));
        }
        let op_time = self.append(i, Operation::DropCollection { ns: ns.clone() });
        Ok(WriteReply { n: 0, op_time })
    }

    // =========================================================================
    // REPLICATION COMMANDS
    // =========================================================================

    pub(crate) fn is_master(&self, id: NodeId) -> CommandResult<IsMasterReply> {
        let i = self.up(id)?;
        let node = &self.nodes[i];
        Ok(IsMasterReply {
            host: node.host.clone(),
            ismaster: node.is_primary(),
            secondary: node.state == SimState::Secondary,
            arbiter_only: node.arbiter,
            state: node.member_state(),
        })
    }

    pub(crate) fn status(&self, id: NodeId) -> CommandResult<ReplSetStatus> {
        let i = self.up(id)?;
        let members = (0..self.nodes.len())
            .map(|j| {
                let other = &self.nodes[j];
                let visible = j == i || (other.is_up() && self.reachable(i, j));
                MemberStatus {
                    id: other.id,
                    host: other.host.clone(),
                    state: if visible {
                        other.member_state()
                    } else {
                        MemberState::Unreachable
                    },
                    optime: if visible && !other.arbiter {
                        Some(other.last_op_time())
                    } else {
                        None
                    },
                }
            })
            .collect();
        let node = &self.nodes[i];
        Ok(ReplSetStatus {
            set: self.config.name.clone(),
            term: node.term,
            my_state: node.member_state(),
            applied_op_time: node.last_op_time(),
            members,
        })
    }

    pub(crate) fn step_up(&mut self, id: NodeId) -> CommandResult<()> {
        let i = self.up(id)?;
        let candidate = &self.nodes[i];
        if candidate.arbiter {
            return Err(CommandError::NotEligible(
                "arbiters cannot stand for election".to_string(),
            ));
        }
        match candidate.state {
            SimState::Primary { .. } => return Ok(()),
            SimState::Secondary => {}
            _ => {
                return Err(CommandError::NotEligible(format!(
                    "node is in state {}",
                    candidate.member_state()
                )))
            }
        }
        if candidate.frozen {
            return Err(CommandError::NotEligible("node is frozen".to_string()));
        }

        let new_term = candidate.term + 1;
        let last = candidate.last_op_time();
        let voters: Vec<usize> = (0..self.nodes.len())
            .filter(|&j| {
                let voter = &self.nodes[j];
                j != i
                    && voter.is_up()
                    && self.reachable(i, j)
                    && voter.term < new_term
                    && (voter.arbiter || voter.last_op_time() <= last)
            })
            .collect();

        let votes = voters.len() + 1;
        let majority = self.majority();
        if votes < majority {
            return Err(CommandError::NotEligible(format!(
                "election failed: received {} of {} required votes",
                votes, majority
            )));
        }

        for j in voters {
            self.nodes[j].term = new_term;
        }
        let node = &mut self.nodes[i];
        node.term = new_term;
        node.state = SimState::Primary {
            elected_in: new_term,
        };
        self.append(
            i,
            Operation::Noop {
                msg: "new primary".to_string(),
            },
        );
        self.pump();
        Ok(())
    }

    pub(crate) fn step_down(&mut self, id: NodeId, force: bool) -> CommandResult<()> {
        let i = self.primary_index(id)?;
        if !force {
            let last = self.nodes[i].last_op_time();
            let caught_up = (0..self.nodes.len()).any(|j| {
                j != i
                    && !self.nodes[j].arbiter
                    && self.nodes[j].is_up()
                    && self.reachable(i, j)
                    && self.nodes[j].last_op_time() == last
            });
            if !caught_up {
                return Err(CommandError::NotEligible(
                    "no electable secondaries caught up".to_string(),
                ));
            }
        }
        self.nodes[i].state = SimState::Secondary;
        Ok(())
    }

    pub(crate) fn rbid(&self, id: NodeId) -> CommandResult<i64> {
        let i = self.up(id)?;
        Ok(self.nodes[i].rbid)
    }

    pub(crate) fn freeze(&mut self, id: NodeId, secs: u64) -> CommandResult<()> {
        let i = self.up(id)?;
        if self.nodes[i].is_primary() && secs > 0 {
            return Err(CommandError::NotEligible(
                "cannot freeze node when primary".to_string(),
            ));
        }
        self.nodes[i].frozen = secs > 0;
        Ok(())
    }

    pub(crate) fn server_status(&self, id: NodeId) -> CommandResult<ServerStatus> {
        self.up(id)?;
        Ok(ServerStatus {
            storage_engine: self.storage.storage_engine.clone(),
            supports_committed_reads: self.storage.supports_committed_reads,
        })
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub(crate) fn list_databases(&self, id: NodeId) -> CommandResult<Vec<String>> {
        let i = self.data_node(id)?;
        Ok(self.nodes[i].data.keys().cloned().collect())
    }

    pub(crate) fn list_collections(&self, id: NodeId, db: &str) -> CommandResult<Vec<CollectionInfo>> {
        let i = self.data_node(id)?;
        Ok(self.nodes[i]
            .data
            .get(db)
            .map(|colls| {
                colls
                    .iter()
                    .map(|(name, coll)| CollectionInfo {
                        name: name.clone(),
                        capped: coll.capped_max.is_some(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    pub(crate) fn find_all(&self, id: NodeId, ns: &Namespace) -> CommandResult<Vec<Document>> {
        let i = self.data_node(id)?;
        Ok(self.nodes[i]
            .collection(ns)
            .map(|c| c.docs.clone())
            .unwrap_or_default())
    }

    pub(crate) fn db_hash(&self, id: NodeId, db: &str) -> CommandResult<DbHashReply> {
        let i = self.data_node(id)?;
        let mut reply = DbHashReply::default();
        let mut db_hasher = Sha256::new();
        if let Some(colls) = self.nodes[i].data.get(db) {
            for (name, coll) in colls {
                let hash = coll.hash();
                db_hasher.update(format!("{}:{}\n", name, hash).as_bytes());
                if coll.capped_max.is_some() {
                    reply.capped.push(name.clone());
                }
                reply.collections.insert(name.clone(), hash);
            }
        }
        reply.md5 = format!("{:x}", db_hasher.finalize());
        Ok(reply)
    }

    pub(crate) fn validate(&self, id: NodeId, ns: &Namespace) -> CommandResult<ValidateReply> {
        let i = self.data_node(id)?;
        let coll = self.nodes[i]
            .collection(ns)
            .ok_or_else(|| CommandError::NamespaceNotFound(ns.to_string()))?;

        let mut errors = Vec::new();
        let mut ids: Vec<String> = coll.docs.iter().map(id_key).collect();
        ids.sort();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            errors.push("duplicate _id values".to_string());
        }
        if let Some(max) = coll.capped_max {
            if coll.docs.len() > max {
                errors.push(format!("capped collection holds {} > {} documents", coll.docs.len(), max));
            }
        }
        Ok(ValidateReply {
            valid: errors.is_empty(),
            errors,
        })
    }

    pub(crate) fn oplog(&self, id: NodeId) -> CommandResult<Vec<OplogEntry>> {
        let i = self.data_node(id)?;
        Ok(self.nodes[i].oplog.clone())
    }

    pub(crate) fn drop_pending(&self, id: NodeId) -> CommandResult<Vec<Namespace>> {
        let i = self.data_node(id)?;
        Ok(self.nodes[i].pending_drops.iter().map(|d| d.ns.clone()).collect())
    }

    // =========================================================================
    // PROCESS CONTROL AND FAULT INJECTION
    // =========================================================================

    pub(crate) fn restart(&mut self, id: NodeId, signal: ShutdownSignal) -> CommandResult<()> {
        let i = self.index(id)?;
        let node = &mut self.nodes[i];
        node.state = if node.arbiter {
            SimState::Arbiter
        } else {
            SimState::Secondary
        };
        node.frozen = false;
        if !signal.is_clean() {
            // Startup recovery replays the oplog
            node.rebuild();
        }
        Ok(())
    }

    pub(crate) fn stop_all(&mut self) {
        for node in &mut self.nodes {
            node.state = SimState::Down;
        }
    }

    pub(crate) fn inject_document(&mut self, id: NodeId, ns: &Namespace, doc: Document) -> CommandResult<()> {
        let i = self.data_node(id)?;
        self.nodes[i]
            .data
            .entry(ns.db.clone())
            .or_default()
            .entry(ns.coll.clone())
            .or_insert_with(|| SimCollection::new(None))
            .push(doc);
        Ok(())
    }

    pub(crate) fn discard_history(&mut self, id: NodeId) -> CommandResult<()> {
        let i = self.data_node(id)?;
        let node = &mut self.nodes[i];
        node.history_floor = node.oplog.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn world() -> World {
        World::initiate(ReplSetConfig::standard("world"), StorageProfile::default())
    }

    fn ns() -> Namespace {
        Namespace::new("test", "c")
    }

    #[test]
    fn test_initiate_elects_first_member() {
        let w = world();
        assert!(w.is_master(NodeId(0)).unwrap().ismaster);
        assert!(w.is_master(NodeId(1)).unwrap().secondary);
        assert!(w.is_master(NodeId(2)).unwrap().arbiter_only);
        assert_eq!(w.oplog(NodeId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_majority_write_replicates() {
        let mut w = world();
        w.insert(NodeId(0), &ns(), json!({"_id": 1}), &WriteConcern::majority(1000))
            .unwrap();
        assert_eq!(w.find_all(NodeId(1), &ns()).unwrap().len(), 1);
    }

    #[test]
    fn test_majority_write_fails_when_partitioned() {
        let mut w = world();
        w.links.disconnect(NodeId(0), NodeId(1)).unwrap();
        let err = w
            .insert(NodeId(0), &ns(), json!({"_id": 1}), &WriteConcern::majority(10))
            .unwrap_err();
        assert!(matches!(err, CommandError::WriteConcernFailed(_)));
        // Applied locally regardless
        assert_eq!(w.find_all(NodeId(0), &ns()).unwrap().len(), 1);
    }

    #[test]
    fn test_primary_steps_down_without_majority() {
        let mut w = world();
        w.links.disconnect(NodeId(0), NodeId(1)).unwrap();
        w.links.disconnect(NodeId(0), NodeId(2)).unwrap();
        w.pump();
        assert_eq!(w.is_master(NodeId(0)).unwrap().state, MemberState::Secondary);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut w = world();
        w.insert(NodeId(0), &ns(), json!({"_id": 1}), &WriteConcern::w1()).unwrap();
        let err = w
            .insert(NodeId(0), &ns(), json!({"_id": 1}), &WriteConcern::w1())
            .unwrap_err();
        assert!(matches!(err, CommandError::DuplicateKey(_)));
    }

    #[test]
    fn test_capped_collection_evicts_oldest() {
        let mut w = world();
        let capped = Namespace::new("test", "capped");
        w.create_collection(NodeId(0), &capped, CollectionOptions::capped(2)).unwrap();
        for i in 0..3 {
            w.insert(NodeId(0), &capped, json!({"_id": i}), &WriteConcern::w1()).unwrap();
        }
        let docs = w.find_all(NodeId(0), &capped).unwrap();
        assert_eq!(docs, vec![json!({"_id": 1}), json!({"_id": 2})]);
        assert_eq!(w.db_hash(NodeId(0), "test").unwrap().capped, vec!["capped".to_string()]);
    }

    #[test]
    fn test_drop_is_pending_for_a_few_pumps() {
        let mut w = world();
        w.insert(NodeId(0), &ns(), json!({"_id": 1}), &WriteConcern::w1()).unwrap();
        w.drop_collection(NodeId(0), &ns()).unwrap();
        assert_eq!(w.drop_pending(NodeId(0)).unwrap(), vec![ns()]);
        for _ in 0..DROP_PENDING_PUMPS {
            w.pump();
        }
        assert!(w.drop_pending(NodeId(0)).unwrap().is_empty());
    }

    #[test]
    fn test_step_up_requires_votes() {
        let mut w = world();
        w.links.disconnect(NodeId(1), NodeId(0)).unwrap();
        w.links.disconnect(NodeId(1), NodeId(2)).unwrap();
        assert!(matches!(w.step_up(NodeId(1)), Err(CommandError::NotEligible(_))));

        w.links.reconnect(NodeId(1), NodeId(2)).unwrap();
        w.step_up(NodeId(1)).unwrap();
        assert!(w.is_master(NodeId(1)).unwrap().ismaster);
        // Old primary sees the newer term through the arbiter
        assert!(!w.is_master(NodeId(0)).unwrap().ismaster);
    }

    #[test]
    fn test_arbiter_has_no_data() {
        let w = world();
        assert!(matches!(
            w.list_databases(NodeId(2)),
            Err(CommandError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_diverged_node_rolls_back() {
        let mut w = world();
        w.links.disconnect(NodeId(0), NodeId(1)).unwrap();
        w.insert(NodeId(0), &ns(), json!({"_id": "doomed"}), &WriteConcern::w1()).unwrap();
        w.links.disconnect(NodeId(0), NodeId(2)).unwrap();
        w.pump();
        w.step_up(NodeId(1)).unwrap();

        w.links.reconnect(NodeId(0), NodeId(1)).unwrap();
        w.links.reconnect(NodeId(0), NodeId(2)).unwrap();
        w.pump();
        assert_eq!(w.is_master(NodeId(0)).unwrap().state, MemberState::Rollback);
        w.pump();
        assert_eq!(w.is_master(NodeId(0)).unwrap().state, MemberState::Secondary);
        assert_eq!(w.rbid(NodeId(0)).unwrap(), 1);
        assert!(w.find_all(NodeId(0), &ns()).unwrap().is_empty());
        assert_eq!(w.oplog(NodeId(0)).unwrap(), w.oplog(NodeId(1)).unwrap());
    }
}
