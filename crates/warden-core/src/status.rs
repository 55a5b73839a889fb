//! The per-call state machine and terminal result types.
//!
//! A call's lifecycle is `validating -> {scheduled -> executing} ->
//! {success | error | cancelled}`. Exactly one status is active at a time,
//! transitions are monotonic, and the three right-hand statuses are
//! terminal. The scheduler's state manager is the only writer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::request::ToolCallRequest;
use crate::types::Timestamp;

/// Why a terminal `error` status was reached.
///
/// Cancellation is a distinct terminal status, not an error kind; callers
/// must not count `cancelled` as failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorType {
    /// No tool with the requested name is registered.
    ToolNotRegistered,
    /// The tool rejected the arguments while building the invocation.
    InvalidToolParams,
    /// The policy engine denied the call.
    PolicyViolation,
    /// The tool ran and reported a failure.
    ExecutionFailed,
    /// Something escaped the pipeline unclassified.
    UnhandledException,
}

impl fmt::Display for ToolErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolNotRegistered => write!(f, "tool not registered"),
            Self::InvalidToolParams => write!(f, "invalid tool params"),
            Self::PolicyViolation => write!(f, "policy violation"),
            Self::ExecutionFailed => write!(f, "execution failed"),
            Self::UnhandledException => write!(f, "unhandled exception"),
        }
    }
}

/// The result payload carried by a terminal `success` or `error` status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    /// Inline result content (possibly truncated).
    pub content: String,
    /// Set on `error` statuses; absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ToolErrorType>,
    /// Where the full output was persisted when truncation applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
}

impl ToolCallResponse {
    /// A successful response.
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error_type: None,
            output_file: None,
        }
    }

    /// A failed response with the declared error kind.
    pub fn error(error_type: ToolErrorType, message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            error_type: Some(error_type),
            output_file: None,
        }
    }

    /// Attach a side-file reference for truncated output.
    #[must_use]
    pub fn with_output_file(mut self, path: PathBuf) -> Self {
        self.output_file = Some(path);
        self
    }

    /// Whether this response carries an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_type.is_some()
    }
}

/// The tagged-union status of a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CallStatus {
    /// The tool was found and the invocation is being validated and
    /// admission checked.
    Validating,
    /// Approved; waiting for the executor.
    Scheduled,
    /// The executor is driving the invocation.
    Executing {
        /// Process id, once a streaming tool reports one.
        #[serde(skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
        /// Most recent live output chunk, for observers.
        #[serde(skip_serializing_if = "Option::is_none")]
        live_output: Option<String>,
    },
    /// Terminal: the tool completed without error.
    Success {
        /// The tool's result.
        response: ToolCallResponse,
    },
    /// Terminal: validation, policy, or execution failed.
    Error {
        /// The failure, with its declared kind.
        response: ToolCallResponse,
    },
    /// Terminal: the call was aborted before or during execution.
    Cancelled {
        /// Why the call was cancelled.
        reason: String,
    },
}

impl CallStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::Error { .. } | Self::Cancelled { .. }
        )
    }

    /// The status discriminant name, for logging and observers.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Scheduled => "scheduled",
            Self::Executing { .. } => "executing",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether `next` is a legal successor of this status.
    ///
    /// Executing-to-executing is legal: pid and live-output updates patch
    /// the payload without changing the discriminant.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (Self::Validating, Self::Scheduled) => true,
            (Self::Scheduled, Self::Executing { .. }) => true,
            (Self::Executing { .. }, Self::Executing { .. }) => true,
            (Self::Executing { .. }, Self::Success { .. } | Self::Error { .. }) => true,
            // A call can fail out of any pre-execution stage (policy deny,
            // build error, hook block) and any non-terminal call can be
            // cancelled.
            (Self::Validating | Self::Scheduled, Self::Error { .. }) => true,
            (_, Self::Cancelled { .. }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Terminal snapshot of a call, handed back to the caller when its batch
/// resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedToolCall {
    /// The original request.
    pub request: ToolCallRequest,
    /// The terminal status (`Success`, `Error`, or `Cancelled`).
    pub status: CallStatus,
    /// When the scheduler accepted the request.
    pub created_at: Timestamp,
    /// When the call reached its terminal status.
    pub completed_at: Timestamp,
}

impl CompletedToolCall {
    /// The response, when the call ended in `Success` or `Error`.
    #[must_use]
    pub fn response(&self) -> Option<&ToolCallResponse> {
        match &self.status {
            CallStatus::Success { response } | CallStatus::Error { response } => Some(response),
            _ => None,
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, CallStatus::Success { .. })
    }

    /// Whether the call was cancelled (distinct from failure).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.status, CallStatus::Cancelled { .. })
    }
}
