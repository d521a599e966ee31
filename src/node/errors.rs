//! Command-level errors returned by a member.

use thiserror::Error;

/// Result type for a single administrative command.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors a member can answer a command with.
///
/// These are the raw replies; deciding whether one is transient or fatal
/// for a rollback run happens in `HarnessError::from_command`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The connection to the member failed or was closed mid-command
    #[error("network error talking to {host}: {reason}")]
    Network { host: String, reason: String },

    /// The command requires a primary and the member is not one
    #[error("not primary")]
    NotPrimary,

    /// The member refused to stand for election or could not win one
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// The write was applied but not acknowledged by enough members
    #[error("write concern failed: {0}")]
    WriteConcernFailed(String),

    /// The member hit a rollback it cannot complete (sync source lost history)
    #[error("unrecoverable rollback: {0}")]
    UnrecoverableRollback(String),

    /// Database or collection does not exist
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// A document with the same `_id` already exists
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The command is not valid for this member (e.g. data command on an arbiter)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl CommandError {
    /// Create a network error for the given host.
    pub fn network(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure happened at the connection level.
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Stable error code name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "HostUnreachable",
            Self::NotPrimary => "NotMaster",
            Self::NotEligible(_) => "NotEligible",
            Self::WriteConcernFailed(_) => "WriteConcernFailed",
            Self::UnrecoverableRollback(_) => "UnrecoverableRollbackError",
            Self::NamespaceNotFound(_) => "NamespaceNotFound",
            Self::DuplicateKey(_) => "DuplicateKey",
            Self::InvalidOperation(_) => "InvalidOptions",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_classification() {
        assert!(CommandError::network("h:1", "closed").is_network_error());
        assert!(!CommandError::NotPrimary.is_network_error());
        assert!(!CommandError::UnrecoverableRollback("x".into()).is_network_error());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CommandError::NotPrimary.code(), "NotMaster");
        assert_eq!(
            CommandError::UnrecoverableRollback("x".into()).code(),
            "UnrecoverableRollbackError"
        );
    }

    #[test]
    fn test_display_includes_host() {
        let err = CommandError::network("localhost:20001", "connection reset");
        assert_eq!(
            err.to_string(),
            "network error talking to localhost:20001: connection reset"
        );
    }
}
