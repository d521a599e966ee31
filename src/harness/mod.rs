//! Topology State Machine
//!
//! The rollback controller (`RollbackTest`), its phase table, the bounded
//! wait every transition is built from, and the error type all of them
//! return.

mod controller;
mod errors;
mod options;
mod phase;
mod wait;

pub use controller::RollbackTest;
pub use errors::{HarnessError, HarnessErrorKind, HarnessResult};
pub use options::RollbackTestOptions;
pub use phase::Phase;
pub use wait::{wait_until, WaitConfig};
