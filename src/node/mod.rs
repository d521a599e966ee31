//! Node Handles
//!
//! A replica set member as the harness sees it: an address, a command
//! connection and the role it was last observed in. The server behind the
//! connection is an external collaborator; only its command surface lives
//! here.

mod errors;
mod handle;
mod role;
mod types;

pub use errors::{CommandError, CommandResult};
pub use handle::{NodeConnection, NodeHandle};
pub use role::{MemberState, NodeId};
pub use types::{
    Acknowledgement, CollectionInfo, CollectionOptions, DbHashReply, Document, IsMasterReply,
    MemberStatus, Namespace, OpTime, OplogEntry, Operation, ReplSetStatus, ServerStatus,
    ValidateReply, WriteConcern, WriteReply,
};
