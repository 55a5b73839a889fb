//! Policy rules, decisions, and the tiered priority scheme.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use warden_core::ApprovalMode;

use crate::error::PolicyResult;

/// Priority granted to rules synthesized from a confirmation outcome.
///
/// Sits near the top of the user tier so a session grant outranks ordinary
/// user-file rules but never an admin rule.
pub const SESSION_GRANT_PRIORITY: f64 = 2.95;

/// The verdict for a proposed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The call may run immediately.
    Allow,
    /// The call must not run.
    Deny,
    /// The call needs human confirmation.
    AskUser,
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
            Self::AskUser => write!(f, "ask_user"),
        }
    }
}

/// Where a rule came from, which fixes its trust tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// Bundled defaults (tier 1).
    Default,
    /// The user's rule file (tier 2).
    User,
    /// A confirmation grant made this session (tier 2).
    SessionGrant,
    /// Admin-managed rules (tier 3). Always outrank user rules.
    Admin,
}

impl RuleSource {
    /// The integer tier base for this source.
    #[must_use]
    pub fn tier_base(self) -> f64 {
        match self {
            Self::Default => 1.0,
            Self::User | Self::SessionGrant => 2.0,
            Self::Admin => 3.0,
        }
    }

    /// Clamp a raw priority into this source's tier: the integer part is
    /// forced to the tier base, the fractional part is kept.
    #[must_use]
    pub fn clamp_priority(self, priority: f64) -> f64 {
        let frac = priority.fract();
        let frac = if frac < 0.0 { 0.0 } else { frac };
        self.tier_base() + frac
    }
}

/// A single admission rule.
///
/// Immutable once loaded. The engine keeps its rule list sorted descending
/// by priority and walks it front to back; the first structural match wins.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    /// Tool the rule applies to: a bare name, a `server__tool` qualified
    /// name, or a `server__*` wildcard. `None` matches every tool.
    pub tool_name: Option<String>,
    /// Pattern over the canonicalized (sorted-key) JSON args.
    pub args_pattern: Option<Regex>,
    /// Approval modes the rule applies in. `None` means all modes.
    pub modes: Option<Vec<ApprovalMode>>,
    /// The rule's verdict when it matches.
    pub decision: PolicyDecision,
    /// Tiered priority; larger wins.
    pub priority: f64,
    /// Whether shell output redirection is declared safe by this rule.
    pub allow_redirection: bool,
    /// Provenance.
    pub source: RuleSource,
}

impl PolicyRule {
    /// Create a rule that matches every tool.
    #[must_use]
    pub fn new(decision: PolicyDecision, priority: f64, source: RuleSource) -> Self {
        Self {
            tool_name: None,
            args_pattern: None,
            modes: None,
            decision,
            priority,
            allow_redirection: false,
            source,
        }
    }

    /// Restrict the rule to one tool (or `server__*` wildcard).
    #[must_use]
    pub fn for_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Restrict the rule to args matching a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PolicyError::InvalidPattern`] when the pattern does
    /// not compile.
    pub fn with_args_pattern(mut self, pattern: &str) -> PolicyResult<Self> {
        self.args_pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Restrict the rule to specific approval modes.
    #[must_use]
    pub fn with_modes(mut self, modes: Vec<ApprovalMode>) -> Self {
        self.modes = Some(modes);
        self
    }

    /// Declare redirection safe under this rule.
    #[must_use]
    pub fn with_redirection_allowed(mut self) -> Self {
        self.allow_redirection = true;
        self
    }

    /// Whether this rule structurally matches a call.
    ///
    /// `server_ctx` is the declared server of a remote tool, when known.
    /// Canonicalized args are computed lazily by the caller and only
    /// consulted when the rule carries an args pattern.
    pub(crate) fn matches(
        &self,
        call_name: &str,
        server_ctx: Option<&str>,
        mode: ApprovalMode,
        args: &mut CanonicalArgs<'_>,
    ) -> bool {
        if !self.matches_name(call_name, server_ctx) {
            return false;
        }
        if let Some(modes) = &self.modes
            && !modes.contains(&mode)
        {
            return false;
        }
        self.args_pattern
            .as_ref()
            .is_none_or(|re| re.is_match(args.get()))
    }

    /// Tool-name matching, including qualified names and wildcards.
    ///
    /// A `server__*` wildcard only matches when the declared server
    /// context, if present, equals `server` exactly. This stops a server
    /// named `trusted__evil` from riding a `trusted__*` allow rule.
    fn matches_name(&self, call_name: &str, server_ctx: Option<&str>) -> bool {
        let Some(pattern) = &self.tool_name else {
            return true;
        };

        if pattern == call_name {
            return true;
        }

        // A qualified rule matches the bare tool name of its own server.
        if let Some(server) = server_ctx
            && let Some(rest) = pattern.strip_prefix(server)
            && let Some(bare) = rest.strip_prefix("__")
            && bare == call_name
        {
            return true;
        }

        if let Some(server) = pattern.strip_suffix("__*") {
            return match server_ctx {
                Some(ctx) => ctx == server,
                None => call_name
                    .strip_prefix(server)
                    .is_some_and(|rest| rest.starts_with("__")),
            };
        }

        false
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @{:.3} ({:?}) -> {}",
            self.tool_name.as_deref().unwrap_or("*"),
            self.priority,
            self.source,
            self.decision
        )
    }
}

/// The result of a policy check.
///
/// The rule is reported for UI and audit even when the decision came from
/// the engine default (in which case it is `None`).
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// The verdict.
    pub decision: PolicyDecision,
    /// The rule responsible, when one matched.
    pub rule: Option<PolicyRule>,
}

impl CheckResult {
    pub(crate) fn new(decision: PolicyDecision, rule: Option<PolicyRule>) -> Self {
        Self { decision, rule }
    }
}

/// Canonicalize JSON args to a stable string with recursively sorted keys.
///
/// Two structurally equal argument objects always canonicalize to the same
/// string, so args patterns match independently of key order.
#[must_use]
pub fn canonicalize_args(args: &Value) -> String {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let entries: std::collections::BTreeMap<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect();
                Value::Object(entries.into_iter().collect())
            },
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(args).to_string()
}

/// Lazily canonicalized args: serialization happens at most once per call,
/// and only if some rule or checker actually needs pattern matching.
pub(crate) struct CanonicalArgs<'a> {
    args: &'a Value,
    cached: Option<String>,
}

impl<'a> CanonicalArgs<'a> {
    pub(crate) fn new(args: &'a Value) -> Self {
        Self { args, cached: None }
    }

    pub(crate) fn get(&mut self) -> &str {
        if self.cached.is_none() {
            self.cached = Some(canonicalize_args(self.args));
        }
        self.cached.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -----------------------------------------------------------------------
    // Canonicalization
    // -----------------------------------------------------------------------

    #[test]
    fn test_canonicalize_sorts_keys() {
        let a = json!({"b": 1, "a": {"z": 2, "y": 3}});
        let b = json!({"a": {"y": 3, "z": 2}, "b": 1});
        assert_eq!(canonicalize_args(&a), canonicalize_args(&b));
        assert_eq!(canonicalize_args(&a), r#"{"a":{"y":3,"z":2},"b":1}"#);
    }

    #[test]
    fn test_canonicalize_preserves_arrays() {
        let v = json!({"items": [3, 1, 2]});
        assert_eq!(canonicalize_args(&v), r#"{"items":[3,1,2]}"#);
    }

    // -----------------------------------------------------------------------
    // Name matching
    // -----------------------------------------------------------------------

    #[test]
    fn test_bare_name_match() {
        let rule = PolicyRule::new(PolicyDecision::Allow, 2.0, RuleSource::User)
            .for_tool("read_file");
        let mut canon = CanonicalArgs::new(&Value::Null);
        assert!(rule.matches("read_file", None, ApprovalMode::Default, &mut canon));
        assert!(!rule.matches("write_file", None, ApprovalMode::Default, &mut canon));
    }

    #[test]
    fn test_qualified_rule_matches_bare_call_with_context() {
        let rule = PolicyRule::new(PolicyDecision::Allow, 2.0, RuleSource::User)
            .for_tool("github__create_issue");
        let mut canon = CanonicalArgs::new(&Value::Null);
        assert!(rule.matches("create_issue", Some("github"), ApprovalMode::Default, &mut canon));
        assert!(!rule.matches("create_issue", Some("gitlab"), ApprovalMode::Default, &mut canon));
        assert!(!rule.matches("create_issue", None, ApprovalMode::Default, &mut canon));
    }

    #[test]
    fn test_wildcard_matches_server_tools() {
        let rule = PolicyRule::new(PolicyDecision::Allow, 2.0, RuleSource::User)
            .for_tool("trusted__*");
        let mut canon = CanonicalArgs::new(&Value::Null);
        assert!(rule.matches("anything", Some("trusted"), ApprovalMode::Default, &mut canon));
        assert!(rule.matches("trusted__fetch", None, ApprovalMode::Default, &mut canon));
    }

    #[test]
    fn test_wildcard_rejects_spoofed_server() {
        // A server literally named "trusted__evil" must not ride the
        // "trusted__*" wildcard even though its qualified tool names start
        // with "trusted__".
        let rule = PolicyRule::new(PolicyDecision::Allow, 2.0, RuleSource::User)
            .for_tool("trusted__*");
        let mut canon = CanonicalArgs::new(&Value::Null);
        assert!(!rule.matches(
            "trusted__evil__tool",
            Some("trusted__evil"),
            ApprovalMode::Default,
            &mut canon
        ));
    }

    // -----------------------------------------------------------------------
    // Args patterns and modes
    // -----------------------------------------------------------------------

    #[test]
    fn test_args_pattern_match() {
        let rule = PolicyRule::new(PolicyDecision::Allow, 2.0, RuleSource::User)
            .for_tool("shell")
            .with_args_pattern(r#""command":"git "#)
            .unwrap();
        let git = json!({"command": "git status"});
        let rm = json!({"command": "rm -rf /"});
        let mut canon_git = CanonicalArgs::new(&git);
        let mut canon_rm = CanonicalArgs::new(&rm);
        assert!(rule.matches("shell", None, ApprovalMode::Default, &mut canon_git));
        assert!(!rule.matches("shell", None, ApprovalMode::Default, &mut canon_rm));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = PolicyRule::new(PolicyDecision::Allow, 2.0, RuleSource::User)
            .with_args_pattern("(unclosed");
        assert!(result.is_err());
    }

    #[test]
    fn test_mode_applicability() {
        let rule = PolicyRule::new(PolicyDecision::Allow, 2.0, RuleSource::User)
            .for_tool("edit_file")
            .with_modes(vec![ApprovalMode::AutoEdit, ApprovalMode::Yolo]);
        let mut canon = CanonicalArgs::new(&Value::Null);
        assert!(rule.matches("edit_file", None, ApprovalMode::AutoEdit, &mut canon));
        assert!(!rule.matches("edit_file", None, ApprovalMode::Default, &mut canon));
    }

    // -----------------------------------------------------------------------
    // Priority tiers
    // -----------------------------------------------------------------------

    #[test]
    fn test_tier_bases() {
        assert_eq!(RuleSource::Default.tier_base(), 1.0);
        assert_eq!(RuleSource::User.tier_base(), 2.0);
        assert_eq!(RuleSource::SessionGrant.tier_base(), 2.0);
        assert_eq!(RuleSource::Admin.tier_base(), 3.0);
    }

    #[test]
    fn test_clamp_priority_keeps_fraction() {
        assert_eq!(RuleSource::Admin.clamp_priority(1.25), 3.25);
        assert_eq!(RuleSource::User.clamp_priority(0.95), 2.95);
        assert_eq!(RuleSource::Default.clamp_priority(-0.5), 1.0);
    }
}
