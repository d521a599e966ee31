//! `SimCluster`: an in-memory replica set behind a simulated bridge.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::connection::SimConnection;
use super::world::{StorageProfile, World};
use crate::cluster::{ClusterBackend, ReplSetConfig, ShutdownSignal};
use crate::fabric::{ConnectivityFabric, FabricResult};
use crate::harness::{HarnessError, HarnessResult};
use crate::node::{CommandResult, Document, Namespace, NodeConnection, NodeId};

/// Handle onto a simulated set. Clones share the same members.
#[derive(Clone)]
pub struct SimCluster {
    world: Arc<Mutex<World>>,
    bridged: bool,
}

pub struct SimClusterBuilder {
    config: ReplSetConfig,
    storage: StorageProfile,
    bridged: bool,
}

impl SimClusterBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: ReplSetConfig::standard(name),
            storage: StorageProfile::default(),
            bridged: true,
        }
    }

    pub fn with_config(mut self, config: ReplSetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_storage(mut self, storage: StorageProfile) -> Self {
        self.storage = storage;
        self
    }

    /// Start the members without a bridge; partitions are then impossible.
    pub fn without_bridge(mut self) -> Self {
        self.bridged = false;
        self
    }

    /// Start every member and initiate the set.
    pub fn build(self) -> SimCluster {
        SimCluster {
            world: Arc::new(Mutex::new(World::initiate(self.config, self.storage))),
            bridged: self.bridged,
        }
    }
}

impl SimCluster {
    pub fn builder(name: &str) -> SimClusterBuilder {
        SimClusterBuilder::new(name)
    }

    /// Standard three-member set with a bridge.
    pub fn standard(name: &str) -> Self {
        Self::builder(name).build()
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write `doc` straight into a member's data, bypassing the oplog.
    ///
    /// The next consistency check on a set touched this way must fail.
    pub fn inject_document(&self, id: NodeId, ns: &Namespace, doc: Document) -> CommandResult<()> {
        self.lock().inject_document(id, ns, doc)
    }

    /// Forget every oplog entry the member currently holds, as if its
    /// oplog had rolled over. Members that must roll back past this point
    /// can no longer do so.
    pub fn discard_history(&self, id: NodeId) -> CommandResult<()> {
        self.lock().discard_history(id)
    }
}

impl ConnectivityFabric for SimCluster {
    fn disconnect(&self, a: NodeId, b: NodeId) -> FabricResult<()> {
        self.lock().links.disconnect(a, b)
    }

    fn reconnect(&self, a: NodeId, b: NodeId) -> FabricResult<()> {
        self.lock().links.reconnect(a, b)
    }

    fn is_reachable(&self, a: NodeId, b: NodeId) -> bool {
        self.lock().links.is_reachable(a, b)
    }
}

impl ClusterBackend for SimCluster {
    fn config(&self) -> ReplSetConfig {
        self.lock().config().clone()
    }

    fn connect(&self, id: NodeId) -> HarnessResult<Arc<dyn NodeConnection>> {
        let world = self.lock();
        if world.config().member(id).is_none() {
            return Err(HarnessError::configuration(format!(
                "{} is not a member of {}",
                id,
                world.config().name
            )));
        }
        let host = world.host(id);
        drop(world);
        Ok(Arc::new(SimConnection::new(id, host, Arc::clone(&self.world))))
    }

    fn fabric(&self) -> Option<Arc<dyn ConnectivityFabric>> {
        if self.bridged {
            Some(Arc::new(self.clone()))
        } else {
            None
        }
    }

    fn restart(&self, id: NodeId, signal: ShutdownSignal) -> HarnessResult<()> {
        self.lock().restart(id, signal)?;
        Ok(())
    }

    fn stop_all(&self) -> HarnessResult<()> {
        self.lock().stop_all();
        Ok(())
    }
}
