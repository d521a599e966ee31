//! Harness Error Types
//!
//! Every failure of a rollback run is classified once, here:
//! - Precondition: the caller asked for an illegal phase transition
//! - Transient: a network blip while polling; retried inside bounded waits
//! - Unrecoverable: the rollback node cannot finish rollback; the run ends
//! - Everything else is fatal to the run
//!
//! Only `Transient` is ever retried.

use std::fmt;

use crate::fabric::FabricError;
use crate::node::CommandError;

/// Harness error type
#[derive(Debug, Clone)]
pub struct HarnessError {
    /// Error kind
    pub kind: HarnessErrorKind,
    /// Error message
    pub message: String,
}

/// Harness error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessErrorKind {
    /// Phase transition not allowed from the current phase
    Precondition,

    /// Temporary network failure; safe to retry
    Transient,

    /// Rollback node lost the history it needs
    Unrecoverable,

    /// A bounded wait ran out of time
    Timeout,

    /// Members disagree on replicated state
    ConsistencyMismatch,

    /// A link could not be severed or restored
    Fabric,

    /// The replica set does not meet the fixture's requirements
    Configuration,

    /// Any other command failure
    Fatal,
}

impl HarnessErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precondition => "PRECONDITION",
            Self::Transient => "TRANSIENT",
            Self::Unrecoverable => "UNRECOVERABLE",
            Self::Timeout => "TIMEOUT",
            Self::ConsistencyMismatch => "CONSISTENCY_MISMATCH",
            Self::Fabric => "FABRIC",
            Self::Configuration => "CONFIGURATION",
            Self::Fatal => "FATAL",
        }
    }
}

impl HarnessError {
    /// Create a new harness error.
    pub fn new(kind: HarnessErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create an illegal transition error.
    pub fn illegal_transition(from: &str, to: &str) -> Self {
        Self::new(
            HarnessErrorKind::Precondition,
            format!("can't transition to phase \"{}\" from phase \"{}\"", to, from),
        )
    }

    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(HarnessErrorKind::Precondition, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HarnessErrorKind::Timeout, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(HarnessErrorKind::Configuration, message)
    }

    /// Create a consistency mismatch error.
    pub fn consistency_mismatch(message: impl Into<String>) -> Self {
        Self::new(HarnessErrorKind::ConsistencyMismatch, message)
    }

    /// Create a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(HarnessErrorKind::Fatal, message)
    }

    /// Classify a command failure.
    pub fn from_command(err: CommandError) -> Self {
        let kind = match &err {
            CommandError::Network { .. } => HarnessErrorKind::Transient,
            CommandError::UnrecoverableRollback(_) => HarnessErrorKind::Unrecoverable,
            _ => HarnessErrorKind::Fatal,
        };
        Self::new(kind, format!("{} ({})", err, err.code()))
    }

    /// Whether a bounded wait may retry after this error.
    pub fn is_transient(&self) -> bool {
        self.kind == HarnessErrorKind::Transient
    }

    /// Whether this error ends the run.
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }

    pub fn is_unrecoverable_rollback(&self) -> bool {
        self.kind == HarnessErrorKind::Unrecoverable
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HarnessError({}): {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for HarnessError {}

impl From<CommandError> for HarnessError {
    fn from(err: CommandError) -> Self {
        Self::from_command(err)
    }
}

impl From<FabricError> for HarnessError {
    fn from(err: FabricError) -> Self {
        Self::new(HarnessErrorKind::Fabric, err.to_string())
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;

    #[test]
    fn test_network_errors_are_transient() {
        let err = HarnessError::from_command(CommandError::network("h:1", "reset"));
        assert_eq!(err.kind, HarnessErrorKind::Transient);
        assert!(err.is_transient());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unrecoverable_rollback_classified() {
        let err = HarnessError::from_command(CommandError::UnrecoverableRollback(
            "sync source too far ahead".into(),
        ));
        assert!(err.is_unrecoverable_rollback());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_other_command_errors_are_fatal() {
        for cmd in [
            CommandError::NotPrimary,
            CommandError::NotEligible("frozen".into()),
            CommandError::WriteConcernFailed("timeout".into()),
        ] {
            let err = HarnessError::from(cmd);
            assert_eq!(err.kind, HarnessErrorKind::Fatal);
        }
    }

    #[test]
    fn test_fabric_errors_map_to_fabric_kind() {
        let err = HarnessError::from(FabricError::UnknownNode(NodeId(4)));
        assert_eq!(err.kind, HarnessErrorKind::Fabric);
        assert!(err.message.contains("node4"));
    }

    #[test]
    fn test_illegal_transition_message() {
        let err = HarnessError::illegal_transition("SteadyStateOps", "SyncSourceOpsDuringRollback");
        assert_eq!(err.kind, HarnessErrorKind::Precondition);
        assert!(err.to_string().contains("PRECONDITION"));
        assert!(err.message.contains("SyncSourceOpsDuringRollback"));
    }
}
