//! Replica set configuration.
//!
//! The rollback fixture only accepts one shape: three members, one of them
//! an arbiter, initiated with an election timeout long enough that no
//! election happens unless the harness forces one.

use serde::{Deserialize, Serialize};

use crate::harness::{HarnessError, HarnessResult};
use crate::node::NodeId;

/// An election timeout at or above this is treated as "never".
pub const FOREVER_MILLIS: u64 = 24 * 60 * 60 * 1000;

/// Number of members the fixture works with.
pub const REQUIRED_MEMBERS: usize = 3;

/// Number of data-bearing members the fixture works with.
pub const DATA_BEARING_MEMBERS: usize = 2;

/// One member of the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    #[serde(rename = "_id")]
    pub id: NodeId,
    pub host: String,
    #[serde(default)]
    pub arbiter_only: bool,
}

/// `settings` sub-document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplSetSettings {
    #[serde(default = "default_election_timeout_millis")]
    pub election_timeout_millis: u64,
}

fn default_election_timeout_millis() -> u64 {
    FOREVER_MILLIS
}

impl Default for ReplSetSettings {
    fn default() -> Self {
        Self {
            election_timeout_millis: default_election_timeout_millis(),
        }
    }
}

/// Replica set config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplSetConfig {
    #[serde(rename = "_id")]
    pub name: String,
    pub members: Vec<MemberConfig>,
    #[serde(default)]
    pub settings: ReplSetSettings,
}

impl ReplSetConfig {
    /// Two data-bearing members followed by an arbiter, high election timeout.
    pub fn standard(name: &str) -> Self {
        let members = (0..REQUIRED_MEMBERS)
            .map(|i| MemberConfig {
                id: NodeId(i),
                host: format!("localhost:{}", 20000 + i),
                arbiter_only: i == REQUIRED_MEMBERS - 1,
            })
            .collect();
        Self {
            name: name.to_string(),
            members,
            settings: ReplSetSettings::default(),
        }
    }

    pub fn member(&self, id: NodeId) -> Option<&MemberConfig> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn arbiters(&self) -> Vec<NodeId> {
        self.members
            .iter()
            .filter(|m| m.arbiter_only)
            .map(|m| m.id)
            .collect()
    }

    pub fn data_bearing(&self) -> Vec<NodeId> {
        self.members
            .iter()
            .filter(|m| !m.arbiter_only)
            .map(|m| m.id)
            .collect()
    }

    /// Check the config against the fixture's requirements.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.members.len() != REQUIRED_MEMBERS {
            return Err(HarnessError::configuration(format!(
                "replica set must contain exactly {} nodes, has {}",
                REQUIRED_MEMBERS,
                self.members.len()
            )));
        }

        let arbiters = self.arbiters().len();
        if arbiters != 1 {
            return Err(HarnessError::configuration(format!(
                "replica set must contain exactly one arbiter, has {}",
                arbiters
            )));
        }

        if self.data_bearing().len() != DATA_BEARING_MEMBERS {
            return Err(HarnessError::configuration(
                "mismatch between number of data bearing nodes and test configuration",
            ));
        }

        for (index, member) in self.members.iter().enumerate() {
            if member.id.index() != index {
                return Err(HarnessError::configuration(format!(
                    "member _id {} does not match its position {}",
                    member.id.index(),
                    index
                )));
            }
        }

        if self.settings.election_timeout_millis < FOREVER_MILLIS {
            return Err(HarnessError::configuration(format!(
                "must initiate the replset with high election timeout: {}ms < {}ms",
                self.settings.election_timeout_millis, FOREVER_MILLIS
            )));
        }

        Ok(())
    }
}
