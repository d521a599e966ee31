//! Member roles as observed through `isMaster`/`replSetGetStatus`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a member within the replica set config (`_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Index of the member in the config's member list.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Last observed state of a member.
///
/// `Rollback` is transient: a member reports it only while it is
/// discarding diverged history. `Unreachable` is never reported by a
/// member itself; it is what the observer records when a command fails
/// at the network level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberState {
    /// Accepting writes
    Primary,
    /// Replicating from the primary
    Secondary,
    /// Voting only, holds no data
    Arbiter,
    /// Discarding diverged oplog entries
    Rollback,
    /// Could not be contacted
    Unreachable,
}

impl MemberState {
    /// Returns the wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberState::Primary => "PRIMARY",
            MemberState::Secondary => "SECONDARY",
            MemberState::Arbiter => "ARBITER",
            MemberState::Rollback => "ROLLBACK",
            MemberState::Unreachable => "UNREACHABLE",
        }
    }

    /// Whether a member in this state can hold replicated data.
    pub fn is_data_bearing(&self) -> bool {
        !matches!(self, MemberState::Arbiter)
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
