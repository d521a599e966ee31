//! In-memory replica set
//!
//! A deterministic model of three members, their oplogs and the bridge in
//! front of them. It answers the same command surface a real member does
//! and implements both `ClusterBackend` and `ConnectivityFabric`, so the
//! rollback controller can run end to end without starting processes.

mod cluster;
mod connection;
mod world;

pub use cluster::{SimCluster, SimClusterBuilder};
pub use world::StorageProfile;
