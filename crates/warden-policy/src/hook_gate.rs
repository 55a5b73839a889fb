//! The narrower admission gate for hook execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PolicyResult;
use crate::rule::PolicyDecision;

/// Where a hook was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookScope {
    /// Defined inside the workspace; only trusted workspaces may run them.
    Project,
    /// Defined in the user's own configuration.
    User,
}

/// A request to run a hook, as seen by the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookCheckRequest {
    /// The hook's name.
    pub hook_name: String,
    /// Where the hook came from.
    pub scope: HookScope,
    /// Whether the current workspace is trusted.
    pub workspace_trusted: bool,
}

/// A checker consulted for hook execution specifically.
///
/// Same veto semantics as [`crate::SafetyChecker`]: `Deny` overrides,
/// `AskUser` upgrades, errors deny.
#[async_trait]
pub trait HookChecker: Send + Sync {
    /// Checker name, for logs.
    fn name(&self) -> &str;

    /// Evaluate the hook request.
    ///
    /// # Errors
    ///
    /// Any error is treated as `Deny` by the engine.
    async fn check(&self, request: &HookCheckRequest) -> PolicyResult<PolicyDecision>;
}
