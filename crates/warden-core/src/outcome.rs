//! The human's resolved choice on a confirmation request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the user resolved a confirmation request.
///
/// Drives whether a new policy rule is synthesized after approval and
/// whether that rule is persisted to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Approve this call only; nothing is remembered.
    ProceedOnce,
    /// Approve and add an in-memory allow rule for the session.
    ProceedAlways,
    /// Approve, add the allow rule, and persist it to the user rule file.
    ProceedAlwaysAndSave,
    /// Approve every tool on the call's server (`server__*` wildcard rule).
    ProceedAlwaysServer,
    /// Approve this tool regardless of arguments.
    ProceedAlwaysTool,
    /// The user wants to edit the invocation before deciding.
    ModifyWithEditor,
    /// Refuse the call; still-queued calls in the batch are cancelled too.
    Cancel,
}

impl ConfirmationOutcome {
    /// Whether this outcome lets the call proceed to execution.
    #[must_use]
    pub fn is_proceed(self) -> bool {
        matches!(
            self,
            Self::ProceedOnce
                | Self::ProceedAlways
                | Self::ProceedAlwaysAndSave
                | Self::ProceedAlwaysServer
                | Self::ProceedAlwaysTool
        )
    }

    /// Whether this outcome synthesizes a new policy rule.
    #[must_use]
    pub fn creates_rule(self) -> bool {
        matches!(
            self,
            Self::ProceedAlways
                | Self::ProceedAlwaysAndSave
                | Self::ProceedAlwaysServer
                | Self::ProceedAlwaysTool
        )
    }

    /// Whether the synthesized rule is persisted to disk.
    #[must_use]
    pub fn persists_rule(self) -> bool {
        matches!(self, Self::ProceedAlwaysAndSave)
    }
}

impl fmt::Display for ConfirmationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProceedOnce => write!(f, "proceed (once)"),
            Self::ProceedAlways => write!(f, "proceed (always)"),
            Self::ProceedAlwaysAndSave => write!(f, "proceed (always, saved)"),
            Self::ProceedAlwaysServer => write!(f, "proceed (always, server)"),
            Self::ProceedAlwaysTool => write!(f, "proceed (always, tool)"),
            Self::ModifyWithEditor => write!(f, "modify with editor"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}
