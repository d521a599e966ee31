//! Cluster Lifecycle Manager
//!
//! Builds or adopts the three-member set the rollback fixture drives and
//! tears it down at the end of the run. Membership never changes while a
//! run is in progress.

mod backend;
mod config;
mod policy;
mod replica_set;

pub use backend::{ClusterBackend, ShutdownSignal};
pub use config::{
    MemberConfig, ReplSetConfig, ReplSetSettings, DATA_BEARING_MEMBERS, FOREVER_MILLIS,
    REQUIRED_MEMBERS,
};
pub use policy::{LivenessPolicy, IN_MEMORY_ENGINE};
pub use replica_set::ReplicaSet;
