//! Safety checkers — pluggable vetoes that run after rule matching.

use async_trait::async_trait;

use warden_core::ToolCallRequest;

use crate::error::PolicyResult;
use crate::rule::PolicyDecision;

/// A registered safety checker.
///
/// Checkers run after rule matching for every call that is not already
/// denied. Their verdicts can only tighten the decision: a `Deny` overrides
/// whatever the rules said, an `AskUser` upgrades an `Allow`, and an
/// `Allow` changes nothing. A checker that returns an error is treated as
/// `Deny` — a broken checker must not grant unintended access.
///
/// # Example
///
/// ```rust,ignore
/// use warden_policy::{PolicyDecision, PolicyResult, SafetyChecker};
/// use warden_core::ToolCallRequest;
///
/// struct NoEtcWrites;
///
/// #[async_trait::async_trait]
/// impl SafetyChecker for NoEtcWrites {
///     fn name(&self) -> &str {
///         "no-etc-writes"
///     }
///
///     fn applies_to(&self, call: &ToolCallRequest) -> bool {
///         call.name == "write_file"
///     }
///
///     async fn check(&self, call: &ToolCallRequest) -> PolicyResult<PolicyDecision> {
///         let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or("");
///         Ok(if path.starts_with("/etc") {
///             PolicyDecision::Deny
///         } else {
///             PolicyDecision::Allow
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait SafetyChecker: Send + Sync {
    /// Checker name, for logs.
    fn name(&self) -> &str;

    /// Whether this checker applies to the call. Non-applicable checkers
    /// are skipped without being awaited.
    fn applies_to(&self, call: &ToolCallRequest) -> bool;

    /// Evaluate the call.
    ///
    /// # Errors
    ///
    /// Any error is treated as `Deny` by the engine.
    async fn check(&self, call: &ToolCallRequest) -> PolicyResult<PolicyDecision>;
}
