//! Rollback Phase Machine
//!
//! Legal edges:
//! - SteadyStateOps → RollbackOps
//! - RollbackOps → SyncSourceOpsBeforeRollback
//! - SyncSourceOpsBeforeRollback → SyncSourceOpsDuringRollback
//! - SyncSourceOpsDuringRollback → SteadyStateOps
//! - SteadyStateOps → Stopped
//!
//! Stopped is terminal. Any other request is a caller bug and fails
//! without changing the phase.

use serde::Serialize;
use std::fmt;

use super::errors::{HarnessError, HarnessResult};

/// Phase of a rollback run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Run finished; the set has been torn down.
    Stopped,

    /// Primary is cut off from the secondary. Writes here will be rolled back.
    RollbackOps,

    /// Old secondary has been elected. Writes here are the history the
    /// rollback node will converge to.
    SyncSourceOpsBeforeRollback,

    /// Rollback node has been reconnected. Writes here may or may not land
    /// while rollback is running; no ordering is promised.
    SyncSourceOpsDuringRollback,

    /// Everything replicates.
    SteadyStateOps,
}

impl Default for Phase {
    fn default() -> Self {
        Self::SteadyStateOps
    }
}

impl Phase {
    /// Every phase, in cycle order.
    pub const ALL: [Phase; 5] = [
        Phase::SteadyStateOps,
        Phase::RollbackOps,
        Phase::SyncSourceOpsBeforeRollback,
        Phase::SyncSourceOpsDuringRollback,
        Phase::Stopped,
    ];

    /// Get the phase name for observability.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::RollbackOps => "RollbackOps",
            Self::SyncSourceOpsBeforeRollback => "SyncSourceOpsBeforeRollback",
            Self::SyncSourceOpsDuringRollback => "SyncSourceOpsDuringRollback",
            Self::SteadyStateOps => "SteadyStateOps",
        }
    }

    /// Phases reachable in one step.
    pub fn successors(&self) -> &'static [Phase] {
        match self {
            Self::Stopped => &[],
            Self::RollbackOps => &[Phase::SyncSourceOpsBeforeRollback],
            Self::SyncSourceOpsBeforeRollback => &[Phase::SyncSourceOpsDuringRollback],
            Self::SyncSourceOpsDuringRollback => &[Phase::SteadyStateOps],
            Self::SteadyStateOps => &[Phase::Stopped, Phase::RollbackOps],
        }
    }

    pub fn can_transition_to(&self, next: Phase) -> bool {
        self.successors().contains(&next)
    }

    /// Move to `next` if the edge exists.
    pub fn transition_to(self, next: Phase) -> HarnessResult<Phase> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HarnessError::illegal_transition(self.name(), next.name()))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::errors::HarnessErrorKind;

    // =========================================================================
    // ALLOWED TRANSITION TESTS
    // =========================================================================

    #[test]
    fn test_starts_in_steady_state() {
        assert_eq!(Phase::default(), Phase::SteadyStateOps);
    }

    #[test]
    fn test_full_cycle() {
        let phase = Phase::SteadyStateOps;
        let phase = phase.transition_to(Phase::RollbackOps).unwrap();
        let phase = phase.transition_to(Phase::SyncSourceOpsBeforeRollback).unwrap();
        let phase = phase.transition_to(Phase::SyncSourceOpsDuringRollback).unwrap();
        let phase = phase.transition_to(Phase::SteadyStateOps).unwrap();
        let phase = phase.transition_to(Phase::Stopped).unwrap();
        assert!(phase.is_terminal());
    }

    // =========================================================================
    // FORBIDDEN TRANSITION TESTS
    // =========================================================================

    #[test]
    fn test_exactly_five_edges() {
        let mut edges = 0;
        for from in Phase::ALL {
            for to in Phase::ALL {
                if from.can_transition_to(to) {
                    edges += 1;
                }
            }
        }
        assert_eq!(edges, 5);
    }

    #[test]
    fn test_forbidden_steady_to_during_rollback() {
        let err = Phase::SteadyStateOps
            .transition_to(Phase::SyncSourceOpsDuringRollback)
            .unwrap_err();
        assert_eq!(err.kind, HarnessErrorKind::Precondition);
    }

    #[test]
    fn test_forbidden_skip_ahead() {
        assert!(Phase::RollbackOps
            .transition_to(Phase::SyncSourceOpsDuringRollback)
            .is_err());
        assert!(Phase::RollbackOps.transition_to(Phase::SteadyStateOps).is_err());
    }

    #[test]
    fn test_no_stop_mid_rollback() {
        for phase in [
            Phase::RollbackOps,
            Phase::SyncSourceOpsBeforeRollback,
            Phase::SyncSourceOpsDuringRollback,
        ] {
            assert!(!phase.can_transition_to(Phase::Stopped));
        }
    }

    #[test]
    fn test_stopped_is_terminal() {
        for to in Phase::ALL {
            assert!(Phase::Stopped.transition_to(to).is_err());
        }
    }

    #[test]
    fn test_no_self_loops() {
        for phase in Phase::ALL {
            assert!(!phase.can_transition_to(phase));
        }
    }
}
