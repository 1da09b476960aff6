// file: src/error.rs
// version: 1.0.0
// guid: 3f9c2b41-8d07-4a6e-b213-57e0a94c1f88

use thiserror::Error;

/// Result type alias for the preparation pipeline
pub type Result<T> = std::result::Result<T, PrepError>;

/// Error types for the DietPi preparation agent
///
/// Two failure classes exist: everything except [`PrepError::Cancelled`]
/// aborts the run with exit code 1; `Cancelled` (user declined a prompt)
/// aborts cleanly with exit code 0.
#[derive(Error, Debug)]
pub enum PrepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Precondition not met: {0}")]
    Precondition(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Command execution error: {0}")]
    Execution(String),

    #[error("Package operation failed: {0}")]
    Package(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cancelled by user")]
    Cancelled,
}

impl PrepError {
    /// Create a new precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a new unsupported-platform error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new command execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a new package operation error
    pub fn package(msg: impl Into<String>) -> Self {
        Self::Package(msg.into())
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new prompt error
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Exit code this error maps to at process level
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 0,
            _ => 1,
        }
    }

    /// Whether this is the clean user-initiated abort
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for PrepError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<inquire::InquireError> for PrepError {
    fn from(err: inquire::InquireError) -> Self {
        match err {
            inquire::InquireError::OperationCanceled
            | inquire::InquireError::OperationInterrupted => Self::Cancelled,
            other => Self::Prompt(other.to_string()),
        }
    }
}
