//! The policy engine: rule matching, shell decomposition, and vetoes.

use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use warden_core::{ApprovalMode, ToolCallRequest};

use crate::checker::SafetyChecker;
use crate::hook_gate::{HookCheckRequest, HookChecker, HookScope};
use crate::rule::{CanonicalArgs, CheckResult, PolicyDecision, PolicyRule};
use crate::shell;

/// The rule-based admission decision engine.
///
/// `check` never mutates engine state; the mutators (`add_rule`,
/// `add_checker`, `remove_rules_for_tool`, `set_approval_mode`) are safe to
/// call between checks. The rule list is kept sorted descending by
/// priority, re-sorted on every insertion, so the first structural match is
/// always the highest-priority one.
pub struct PolicyEngine {
    /// Rules, sorted descending by priority.
    rules: Vec<PolicyRule>,
    /// Safety checkers, consulted after rule matching.
    checkers: Vec<Arc<dyn SafetyChecker>>,
    /// Checkers consulted for hook execution.
    hook_checkers: Vec<Arc<dyn HookChecker>>,
    /// Agent-wide approval posture.
    approval_mode: ApprovalMode,
    /// Decision when no rule matches.
    default_decision: PolicyDecision,
    /// With no human attached, ASK_USER coerces to DENY.
    non_interactive: bool,
    /// Global hook kill-switch.
    hooks_enabled: bool,
    /// Tools whose `command` argument is decomposed before deciding.
    shell_tools: HashSet<String>,
}

impl PolicyEngine {
    /// Create an engine with no rules, default decision ASK_USER, and
    /// `shell` registered as the shell-execution tool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            checkers: Vec::new(),
            hook_checkers: Vec::new(),
            approval_mode: ApprovalMode::Default,
            default_decision: PolicyDecision::AskUser,
            non_interactive: false,
            hooks_enabled: true,
            shell_tools: ["shell".to_string()].into_iter().collect(),
        }
    }

    /// Add a rule and restore the descending-priority order.
    ///
    /// The sort is stable, so rules with equal priority keep insertion
    /// order.
    pub fn add_rule(&mut self, rule: PolicyRule) {
        debug!(rule = %rule, "Adding policy rule");
        self.rules.push(rule);
        self.rules
            .sort_by(|a, b| b.priority.total_cmp(&a.priority));
    }

    /// Add several rules at once.
    pub fn add_rules(&mut self, rules: impl IntoIterator<Item = PolicyRule>) {
        self.rules.extend(rules);
        self.rules
            .sort_by(|a, b| b.priority.total_cmp(&a.priority));
    }

    /// Remove every rule scoped to `tool_name`.
    pub fn remove_rules_for_tool(&mut self, tool_name: &str) {
        self.rules
            .retain(|r| r.tool_name.as_deref() != Some(tool_name));
    }

    /// Register a safety checker.
    pub fn add_checker(&mut self, checker: Arc<dyn SafetyChecker>) {
        self.checkers.push(checker);
    }

    /// Register a hook checker.
    pub fn add_hook_checker(&mut self, checker: Arc<dyn HookChecker>) {
        self.hook_checkers.push(checker);
    }

    /// Set the agent-wide approval posture.
    pub fn set_approval_mode(&mut self, mode: ApprovalMode) {
        self.approval_mode = mode;
    }

    /// The current approval posture.
    #[must_use]
    pub fn approval_mode(&self) -> ApprovalMode {
        self.approval_mode
    }

    /// Set the decision applied when no rule matches.
    pub fn set_default_decision(&mut self, decision: PolicyDecision) {
        self.default_decision = decision;
    }

    /// Mark the engine as running without a human attached.
    pub fn set_non_interactive(&mut self, non_interactive: bool) {
        self.non_interactive = non_interactive;
    }

    /// Enable or disable hook execution globally.
    pub fn set_hooks_enabled(&mut self, enabled: bool) {
        self.hooks_enabled = enabled;
    }

    /// Register an additional shell-execution tool name.
    pub fn register_shell_tool(&mut self, name: impl Into<String>) {
        self.shell_tools.insert(name.into());
    }

    /// The number of loaded rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Decide whether a proposed call may run.
    ///
    /// `server_ctx` is the declared server of a remote tool, when known.
    /// Shell-execution tools are decomposed into sub-commands before the
    /// verdict is final. Non-interactive coercion is applied here, exactly
    /// once, after all other layers.
    pub async fn check(&self, call: &ToolCallRequest, server_ctx: Option<&str>) -> CheckResult {
        let mut result = self.check_inner(call, server_ctx).await;
        if self.non_interactive && result.decision == PolicyDecision::AskUser {
            debug!(call = %call, "Non-interactive: coercing ASK_USER to DENY");
            result.decision = PolicyDecision::Deny;
        }
        result
    }

    /// The uncoerced check, shared by the top level and shell recursion.
    ///
    /// Returns an explicit `BoxFuture` rather than being an `async fn`: the
    /// shell decomposition recurses back into this method, and the declared
    /// `Send` boxed type is what lets that recursion's `Send` inference
    /// terminate.
    fn check_inner<'a>(
        &'a self,
        call: &'a ToolCallRequest,
        server_ctx: Option<&'a str>,
    ) -> BoxFuture<'a, CheckResult> {
        Box::pin(async move {
            let mut args = CanonicalArgs::new(&call.args);
            let matched = self.find_rule(&call.name, server_ctx, &mut args).cloned();

            let mut result = if self.shell_tools.contains(&call.name) {
                self.check_shell(call, server_ctx, matched).await
            } else {
                match matched {
                    Some(rule) => CheckResult::new(rule.decision, Some(rule)),
                    None => CheckResult::new(self.default_decision, None),
                }
            };

            if result.decision != PolicyDecision::Deny {
                result.decision = self.apply_checkers(call, result.decision).await;
            }

            result
        })
    }

    /// The highest-priority rule structurally matching the call.
    fn find_rule(
        &self,
        call_name: &str,
        server_ctx: Option<&str>,
        args: &mut CanonicalArgs<'_>,
    ) -> Option<&PolicyRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(call_name, server_ctx, self.approval_mode, args))
    }

    /// Evaluate a shell-execution call by decomposing its command string.
    async fn check_shell(
        &self,
        call: &ToolCallRequest,
        server_ctx: Option<&str>,
        matched: Option<PolicyRule>,
    ) -> CheckResult {
        let Some(command) = call.args.get("command").and_then(Value::as_str) else {
            // No command string to reason about: force a confirmation.
            return CheckResult::new(PolicyDecision::AskUser, matched);
        };

        let Some(segments) = shell::split_commands(command) else {
            // Unparsable commands must not silently ALLOW.
            warn!(command, "Unparsable shell command; forcing confirmation");
            return CheckResult::new(PolicyDecision::AskUser, matched);
        };

        // The matched rule's own DENY covers the whole command.
        if matched
            .as_ref()
            .is_some_and(|r| r.decision == PolicyDecision::Deny)
        {
            return CheckResult::new(PolicyDecision::Deny, matched);
        }

        if segments.len() <= 1 {
            // Base case: a single sub-command (or an empty command). No
            // further decomposition; this also bounds the recursion when a
            // sub-command equals the original string.
            let rule_decision = matched
                .as_ref()
                .map_or(self.default_decision, |r| r.decision);
            let allow_redirection = matched.as_ref().is_some_and(|r| r.allow_redirection);
            let mut decision = rule_decision;
            if decision == PolicyDecision::Allow
                && shell::has_redirection(command)
                && !allow_redirection
                && !self.approval_mode.allows_redirection()
            {
                decision = PolicyDecision::AskUser;
            }
            return CheckResult::new(decision, matched);
        }

        // Evaluate optimistically from ALLOW and downgrade. A DENY in any
        // sub-command wins immediately; an ASK_USER downgrades but the scan
        // continues in case a later sub-command DENYs.
        let mut aggregate = PolicyDecision::Allow;
        let mut responsible = matched.clone();
        for segment in &segments {
            let sub_call = ToolCallRequest::new(
                call.call_id.as_str(),
                call.name.clone(),
                json!({ "command": segment }),
            );
            let sub = self.check_inner(&sub_call, server_ctx).await;
            match sub.decision {
                PolicyDecision::Deny => {
                    return CheckResult::new(
                        PolicyDecision::Deny,
                        sub.rule.or_else(|| matched.clone()),
                    );
                },
                PolicyDecision::AskUser => {
                    if aggregate == PolicyDecision::Allow {
                        aggregate = PolicyDecision::AskUser;
                        if sub.rule.is_some() {
                            responsible = sub.rule;
                        }
                    }
                },
                PolicyDecision::Allow => {},
            }
        }

        CheckResult::new(aggregate, responsible)
    }

    /// Run the registered safety checkers over a not-yet-denied decision.
    async fn apply_checkers(
        &self,
        call: &ToolCallRequest,
        mut decision: PolicyDecision,
    ) -> PolicyDecision {
        for checker in &self.checkers {
            if !checker.applies_to(call) {
                continue;
            }
            match checker.check(call).await {
                Ok(PolicyDecision::Deny) => return PolicyDecision::Deny,
                Ok(PolicyDecision::AskUser) => {
                    if decision == PolicyDecision::Allow {
                        decision = PolicyDecision::AskUser;
                    }
                },
                Ok(PolicyDecision::Allow) => {},
                Err(e) => {
                    // Fail closed: a broken checker must not grant access.
                    warn!(checker = checker.name(), error = %e, "Safety checker failed; denying");
                    return PolicyDecision::Deny;
                },
            }
        }
        decision
    }

    /// Gate a hook execution.
    ///
    /// Hooks disabled globally deny everything; project-scoped hooks deny
    /// in untrusted workspaces; otherwise hook checkers run with the same
    /// veto semantics as safety checkers and the default is ALLOW.
    pub async fn check_hook(&self, request: &HookCheckRequest) -> PolicyDecision {
        if !self.hooks_enabled {
            return PolicyDecision::Deny;
        }
        if request.scope == HookScope::Project && !request.workspace_trusted {
            debug!(hook = %request.hook_name, "Project hook in untrusted workspace; denying");
            return PolicyDecision::Deny;
        }

        let mut decision = PolicyDecision::Allow;
        for checker in &self.hook_checkers {
            match checker.check(request).await {
                Ok(PolicyDecision::Deny) => return PolicyDecision::Deny,
                Ok(PolicyDecision::AskUser) => decision = PolicyDecision::AskUser,
                Ok(PolicyDecision::Allow) => {},
                Err(e) => {
                    warn!(checker = checker.name(), error = %e, "Hook checker failed; denying");
                    return PolicyDecision::Deny;
                },
            }
        }

        if self.non_interactive && decision == PolicyDecision::AskUser {
            return PolicyDecision::Deny;
        }
        decision
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("rules", &self.rules.len())
            .field("checkers", &self.checkers.len())
            .field("approval_mode", &self.approval_mode)
            .field("default_decision", &self.default_decision)
            .field("non_interactive", &self.non_interactive)
            .finish_non_exhaustive()
    }
}
