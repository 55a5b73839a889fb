//! Tool execution errors.

use warden_core::ToolErrorType;

/// Tool build and execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid arguments.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Timeout.
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ToolError {
    /// The declared error kind surfaced on a terminal `error` status.
    #[must_use]
    pub fn error_type(&self) -> ToolErrorType {
        match self {
            Self::InvalidArguments(_) => ToolErrorType::InvalidToolParams,
            Self::Io(_) | Self::ExecutionFailed(_) | Self::Timeout(_) => {
                ToolErrorType::ExecutionFailed
            },
        }
    }
}

/// Result type for tool operations.
pub type ToolsResult<T> = Result<T, ToolError>;
