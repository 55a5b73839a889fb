//! The on-disk rule source file and atomic grant persistence.
//!
//! Rule files are TOML tables of rules. Warden consumes them from the
//! bundled, user, and admin tiers, and produces exactly one: the user-tier
//! append file that "always allow and save" grants land in. Writes go to a
//! temp file in the same directory followed by a rename, so a crash never
//! leaves a half-written rule file behind.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::error::{PolicyError, PolicyResult};
use crate::rule::{PolicyDecision, PolicyRule, RuleSource};

/// One rule as it appears in a rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFileEntry {
    /// Bare tool name the rule covers. Omit for server-wide rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Server scope. Combined with `tool_name` into the qualified form;
    /// alone it compiles to a `server__*` wildcard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_name: Option<String>,
    /// The rule's verdict.
    pub decision: PolicyDecision,
    /// Intra-tier priority; the integer part is forced to the file's tier.
    pub priority: f64,
    /// Shell command prefix, compiled to an args pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_prefix: Option<String>,
    /// Raw args pattern; takes precedence over `command_prefix`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_pattern: Option<String>,
    /// Whether the rule declares shell redirection safe.
    #[serde(default)]
    pub allow_redirection: bool,
}

impl RuleFileEntry {
    /// Compile this entry into a [`PolicyRule`] at the given trust tier.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] when the args pattern or
    /// command prefix does not compile.
    pub fn into_rule(self, source: RuleSource) -> PolicyResult<PolicyRule> {
        let tool_name = match (self.tool_name, self.mcp_name) {
            (Some(tool), Some(server)) => Some(format!("{server}__{tool}")),
            (None, Some(server)) => Some(format!("{server}__*")),
            (tool, None) => tool,
        };

        let mut rule = PolicyRule::new(
            self.decision,
            source.clamp_priority(self.priority),
            source,
        );
        if let Some(tool) = tool_name {
            rule = rule.for_tool(tool);
        }
        if self.allow_redirection {
            rule = rule.with_redirection_allowed();
        }
        if let Some(pattern) = self.args_pattern {
            rule = rule.with_args_pattern(&pattern)?;
        } else if let Some(prefix) = self.command_prefix {
            rule = rule.with_args_pattern(&command_prefix_pattern(&prefix))?;
        }
        Ok(rule)
    }
}

/// A rule file: a structured table of rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    /// The rules, in file order.
    #[serde(default)]
    pub rules: Vec<RuleFileEntry>,
}

/// Compile a shell command prefix into a pattern over canonicalized args.
///
/// The pattern requires a token boundary after the prefix, so a grant for
/// `git` covers `git status` but not `github-runner`.
#[must_use]
pub fn command_prefix_pattern(prefix: &str) -> String {
    format!(r#""command":"{}( |")"#, regex::escape(prefix))
}

/// Load a rule file, clamping every rule into the `source` trust tier.
///
/// A missing file is an empty rule set, not an error.
///
/// # Errors
///
/// Propagates I/O failures, TOML parse failures, and invalid patterns.
pub fn load_rule_file(path: &Path, source: RuleSource) -> PolicyResult<Vec<PolicyRule>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)?;
    let file: RuleFile = toml::from_str(&contents)?;
    debug!(path = %path.display(), count = file.rules.len(), "Loaded rule file");
    file.rules
        .into_iter()
        .map(|entry| entry.into_rule(source))
        .collect()
}

/// Append a rule to a rule file atomically.
///
/// The whole updated table is serialized to a temp file in the same
/// directory and renamed over the original.
///
/// # Errors
///
/// Propagates I/O and serialization failures. The original file is left
/// untouched on any failure.
pub fn append_rule(path: &Path, entry: RuleFileEntry) -> PolicyResult<()> {
    let mut file = if path.exists() {
        toml::from_str(&std::fs::read_to_string(path)?)?
    } else {
        RuleFile::default()
    };
    file.rules.push(entry);

    let serialized = toml::to_string_pretty(&file)?;
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match parent {
        Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
        None => tempfile::NamedTempFile::new()?,
    };
    tmp.write_all(serialized.as_bytes())?;
    tmp.persist(path).map_err(|e| PolicyError::Io(e.error))?;
    debug!(path = %path.display(), "Appended rule");
    Ok(())
}
