use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Tool failure: {message}")]
    ToolFailure {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure category surfaced to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    PermissionDenied,
    ToolFailure,
    UnsupportedConfiguration,
    PreconditionNotMet,
    /// Another action is still in flight
    Busy,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::ToolFailure => "tool failure",
            FailureKind::UnsupportedConfiguration => "unsupported configuration",
            FailureKind::PreconditionNotMet => "precondition not met",
            FailureKind::Busy => "busy",
        }
    }
}

impl Error {
    /// Shorthand for a tool that ran and did not do what was asked
    pub fn tool(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Error::ToolFailure {
            message: message.into(),
            exit_code,
        }
    }

    /// Map the error onto the user-facing taxonomy.
    ///
    /// Parse errors come from unexpected tool output, IO and D-Bus errors
    /// from the transport to a tool, so all of them count as tool failures.
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::PermissionDenied(_) => FailureKind::PermissionDenied,
            Error::UnsupportedConfiguration(_) => FailureKind::UnsupportedConfiguration,
            Error::PreconditionNotMet(_) | Error::Config(_) => FailureKind::PreconditionNotMet,
            Error::ToolFailure { .. } | Error::Parse(_) | Error::Dbus(_) | Error::Io(_) => {
                FailureKind::ToolFailure
            }
        }
    }

    /// Exit code of the underlying command, when one ran
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ToolFailure { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_display() {
        let err = Error::PermissionDenied("authentication dialog dismissed".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Permission denied"));
        assert!(msg.contains("dismissed"));
    }

    #[test]
    fn test_tool_failure_display() {
        let err = Error::tool("grubby exited with status 1", Some(1));
        let msg = format!("{}", err);
        assert!(msg.contains("Tool failure"));
        assert!(msg.contains("grubby"));
        assert_eq!(err.exit_code(), Some(1));
    }

    #[test]
    fn test_permission_denied_is_distinct_from_tool_failure() {
        let denied = Error::PermissionDenied("x".to_string());
        let failed = Error::tool("x", Some(126));
        assert_ne!(denied.kind(), failed.kind());
        assert_ne!(denied.kind().label(), failed.kind().label());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::UnsupportedConfiguration("zfs".into()).kind(),
            FailureKind::UnsupportedConfiguration
        );
        assert_eq!(
            Error::PreconditionNotMet("disk full".into()).kind(),
            FailureKind::PreconditionNotMet
        );
        assert_eq!(Error::Parse("bad".into()).kind(), FailureKind::ToolFailure);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        let msg = format!("{}", err);
        assert!(msg.contains("IO error"));
        assert!(msg.contains("file not found"));
        assert_eq!(err.kind(), FailureKind::ToolFailure);
        assert_eq!(err.exit_code(), None);
    }
}
