//! Convenience re-exports for downstream crates.

pub use crate::ids::{CallId, CorrelationId, SchedulerId};
pub use crate::outcome::ConfirmationOutcome;
pub use crate::request::ToolCallRequest;
pub use crate::status::{CallStatus, CompletedToolCall, ToolCallResponse, ToolErrorType};
pub use crate::types::{ApprovalMode, Timestamp};
