//! Warden Policy - Rule-based admission decisions for agent tool calls.
//!
//! The policy engine is a pure decision function: given a proposed call and
//! its server context, it returns ALLOW / DENY / ASK_USER plus the rule
//! responsible. It owns no I/O and no concurrency state.
//!
//! # Decision layers
//!
//! 1. Priority-ordered rule matching ([`PolicyRule`]) — the first structural
//!    match in descending-priority order wins.
//! 2. Shell decomposition — compound commands are split into sub-commands
//!    and each is admission checked; denial is never bypassed by chaining,
//!    and an unparsable command fails closed to a confirmation.
//! 3. Registered [`SafetyChecker`]s — a checker DENY overrides, a checker
//!    ASK_USER upgrades ALLOW, and a checker failure is a DENY.
//! 4. Non-interactive coercion — with no human attached, ASK_USER becomes
//!    DENY.
//!
//! Rule priorities are tiered real numbers: the integer part is the trust
//! tier (1 = bundled, 2 = user, 3 = admin), the fractional part orders
//! within a tier. Admin rules therefore always outrank user rules.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod checker;
pub mod engine;
/// Error types and results for policy operations.
pub mod error;
pub mod hook_gate;
pub mod rule;
pub mod shell;
pub mod store;

pub use checker::SafetyChecker;
pub use engine::PolicyEngine;
pub use error::{PolicyError, PolicyResult};
pub use hook_gate::{HookChecker, HookCheckRequest, HookScope};
pub use rule::{
    canonicalize_args, CheckResult, PolicyDecision, PolicyRule, RuleSource,
    SESSION_GRANT_PRIORITY,
};
pub use store::{append_rule, load_rule_file, RuleFile, RuleFileEntry};
