//! Common types: timestamps and the agent-wide approval mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Duration elapsed since another timestamp, saturating at zero.
    #[must_use]
    pub fn since(&self, earlier: &Self) -> chrono::Duration {
        self.0.signed_duration_since(earlier.0).max(chrono::Duration::zero())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Agent-wide approval posture.
///
/// Gates which policy rules apply and whether undeclared output redirection
/// in shell commands forces a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Standard posture: sensitive calls are confirmed by the user.
    Default,
    /// File edits proceed without confirmation; everything else as default.
    AutoEdit,
    /// Read-only planning: mutating calls are withheld.
    Plan,
    /// Everything proceeds without confirmation.
    Yolo,
}

impl ApprovalMode {
    /// Whether this mode waives the undeclared-redirection confirmation.
    #[must_use]
    pub fn allows_redirection(self) -> bool {
        matches!(self, Self::AutoEdit | Self::Yolo)
    }
}

impl Default for ApprovalMode {
    fn default() -> Self {
        Self::Default
    }
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::AutoEdit => write!(f, "auto_edit"),
            Self::Plan => write!(f, "plan"),
            Self::Yolo => write!(f, "yolo"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert!(b >= a);
    }

    #[test]
    fn test_since_saturates() {
        let a = Timestamp::now();
        let b = Timestamp::now();
        assert_eq!(a.since(&b).min(chrono::Duration::zero()), chrono::Duration::zero());
    }

    #[test]
    fn test_mode_redirection_waiver() {
        assert!(ApprovalMode::AutoEdit.allows_redirection());
        assert!(ApprovalMode::Yolo.allows_redirection());
        assert!(!ApprovalMode::Default.allows_redirection());
        assert!(!ApprovalMode::Plan.allows_redirection());
    }

    #[test]
    fn test_mode_serde_snake_case() {
        let json = serde_json::to_string(&ApprovalMode::AutoEdit).unwrap();
        assert_eq!(json, "\"auto_edit\"");
    }
}
