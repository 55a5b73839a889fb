//! The immutable description of a proposed tool call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::ids::{CallId, SchedulerId};

/// A proposed action against the user's machine.
///
/// Created by the caller and never mutated afterwards. When a confirmation
/// resolves with an edited invocation, the scheduler records a *new* request
/// rather than patching this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique id for this call, assigned by the caller.
    pub call_id: CallId,
    /// Name of the tool to invoke. Remote-server tools use the
    /// `server__tool` qualified form.
    pub name: String,
    /// Structured arguments, validated by the tool when the invocation is
    /// built.
    pub args: Value,
    /// Scheduler this request targets, for nested agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler_id: Option<SchedulerId>,
    /// The call that spawned this one, for nested agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_call_id: Option<CallId>,
}

impl ToolCallRequest {
    /// Create a request with no nesting metadata.
    pub fn new(call_id: impl Into<CallId>, name: impl Into<String>, args: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args,
            scheduler_id: None,
            parent_call_id: None,
        }
    }

    /// Attach the scheduler this request targets.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler_id: SchedulerId) -> Self {
        self.scheduler_id = Some(scheduler_id);
        self
    }

    /// Attach the parent call that spawned this request.
    #[must_use]
    pub fn with_parent(mut self, parent: CallId) -> Self {
        self.parent_call_id = Some(parent);
        self
    }
}

impl fmt::Display for ToolCallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = ToolCallRequest::new("c1", "read_file", serde_json::json!({"path": "/tmp/x"}))
            .with_parent(CallId::new("c0"));
        assert_eq!(req.name, "read_file");
        assert_eq!(req.parent_call_id, Some(CallId::new("c0")));
        assert!(req.scheduler_id.is_none());
    }

    #[test]
    fn test_request_serde_omits_empty_nesting() {
        let req = ToolCallRequest::new("c1", "shell", serde_json::json!({"command": "ls"}));
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("scheduler_id"));
        assert!(!json.contains("parent_call_id"));
    }
}
