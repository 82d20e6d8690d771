//! Application-wide error types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Every variant is recovered at the job boundary and turned into a reply;
/// none of them are fatal to the process.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Command not found: {0}")]
    UnknownCommand(String),

    #[error("No valid input found: {0}")]
    InputNotFound(String),

    #[error("Input is {size} bytes, over the {limit} byte limit")]
    InputTooLarge { size: u64, limit: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Engine error: {message}")]
    Engine { message: String, stderr: String },

    #[error("Result is {size} bytes, over the {limit} byte limit")]
    OversizeResult { size: u64, limit: u64 },

    #[error("Throttled: retry after {:.1}s", retry_after.as_secs_f64())]
    Throttled { retry_after: Duration },

    #[error("Workspace error while {op} {}: {source}", path.display())]
    Workspace {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::InputNotFound(reason.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    pub fn engine(message: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
            stderr: stderr.into(),
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn workspace(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Workspace {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short stable name of the variant, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::InputNotFound(_) => "input_not_found",
            Self::InputTooLarge { .. } => "input_too_large",
            Self::Validation(_) => "validation",
            Self::Engine { .. } => "engine",
            Self::OversizeResult { .. } => "oversize_result",
            Self::Throttled { .. } => "throttled",
            Self::Workspace { .. } => "workspace",
            Self::Transfer(_) => "transfer",
            Self::Delivery(_) => "delivery",
            Self::InvalidStateTransition { .. } => "state",
            Self::Configuration(_) => "configuration",
            Self::Serialization(_) => "serialization",
            Self::IoPath { .. } | Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

impl From<filtergraph::GraphError> for Error {
    fn from(err: filtergraph::GraphError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_is_validation() {
        let err: Error = filtergraph::GraphError::EmptyPlan.into();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_throttled_display_rounds() {
        let err = Error::Throttled {
            retry_after: Duration::from_millis(3_260),
        };
        assert_eq!(err.to_string(), "Throttled: retry after 3.3s");
    }
}
