//! The hook collaborator interface consumed around tool execution.

use async_trait::async_trait;
use serde_json::Value;

use warden_core::ToolCallResponse;

/// A hook's verdict on a tool call.
#[derive(Debug, Clone, Default)]
pub struct HookDecision {
    /// Whether execution must be short-circuited.
    pub blocked: bool,
    /// Why, when blocked.
    pub reason: Option<String>,
    /// Replacement arguments, when the hook rewrites the call.
    pub modified_args: Option<Value>,
}

impl HookDecision {
    /// Let the call proceed unchanged.
    #[must_use]
    pub fn proceed() -> Self {
        Self::default()
    }

    /// Block the call.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            reason: Some(reason.into()),
            modified_args: None,
        }
    }
}

/// Hook subsystem collaborator, fired around tool invocation.
///
/// A blocking before-result short-circuits execution with a
/// policy-violation-shaped error. The after event is informational; its
/// failures must never affect the call's result.
#[async_trait]
pub trait ToolHooks: Send + Sync {
    /// Fired before the invocation runs.
    async fn fire_before_tool(&self, tool_name: &str, args: &Value) -> HookDecision;

    /// Fired after the invocation settles (success or error).
    async fn fire_after_tool(&self, tool_name: &str, args: &Value, response: &ToolCallResponse);
}
