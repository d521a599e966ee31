//! rollback-harness - Deterministic rollback scenarios for replica sets
//!
//! A controller (`harness::RollbackTest`) walks a primary/secondary/arbiter
//! set through partition and election steps so that writes on the old
//! primary are rolled back, then checks every member converged
//! (`verify`). Members are reached through `node::NodeConnection`; `sim`
//! provides an in-memory set implementing it.

pub mod cli;
pub mod cluster;
pub mod fabric;
pub mod harness;
pub mod node;
pub mod observability;
pub mod sim;
pub mod verify;
