//! Bus message types and topic names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_core::{CallId, ConfirmationOutcome, CorrelationId};

/// Topic names for bus routing.
pub mod topics {
    /// Scheduler -> UI: a call needs human confirmation.
    pub const TOOL_CONFIRMATION_REQUEST: &str = "tool_confirmation_request";
    /// UI -> Scheduler: the human's answer.
    pub const TOOL_CONFIRMATION_RESPONSE: &str = "tool_confirmation_response";
    /// Scheduler -> consumers: a new policy rule was granted.
    pub const UPDATE_POLICY: &str = "update_policy";
}

/// Serializable call details carried on a confirmation request.
///
/// Everything a UI needs to render an informed prompt; never the live
/// invocation itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDetails {
    /// The call awaiting confirmation.
    pub call_id: CallId,
    /// Tool name as requested (qualified form for server tools).
    pub tool_name: String,
    /// Declared server for remote tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// The arguments the tool would run with.
    pub args: Value,
    /// Human-readable description of what the call would do.
    pub description: String,
}

/// A request for human confirmation, published by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    /// Token pairing this request with its response.
    pub correlation_id: CorrelationId,
    /// What the user is being asked to approve.
    pub details: CallDetails,
}

/// The UI's answer to a confirmation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    /// Token from the request being answered.
    pub correlation_id: CorrelationId,
    /// Coarse yes/no; refined by `outcome` when present.
    pub confirmed: bool,
    /// The specific choice, when the UI distinguishes more than yes/no.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ConfirmationOutcome>,
    /// Outcome-specific payload (e.g. edited arguments).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ConfirmationResponse {
    /// A plain approval.
    #[must_use]
    pub fn approved(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            confirmed: true,
            outcome: None,
            payload: None,
        }
    }

    /// A plain refusal.
    #[must_use]
    pub fn denied(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            confirmed: false,
            outcome: None,
            payload: None,
        }
    }

    /// An answer with an explicit outcome.
    #[must_use]
    pub fn with_outcome(correlation_id: CorrelationId, outcome: ConfirmationOutcome) -> Self {
        Self {
            correlation_id,
            confirmed: outcome.is_proceed(),
            outcome: Some(outcome),
            payload: None,
        }
    }

    /// Attach an outcome payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The effective outcome: an explicit one wins; otherwise `confirmed`
    /// maps to `ProceedOnce` or `Cancel`.
    #[must_use]
    pub fn resolved_outcome(&self) -> ConfirmationOutcome {
        self.outcome.unwrap_or(if self.confirmed {
            ConfirmationOutcome::ProceedOnce
        } else {
            ConfirmationOutcome::Cancel
        })
    }
}

/// A granted policy rule, published so external consumers (settings UI,
/// audit) observe it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyUpdate {
    /// Tool the grant covers.
    pub tool_name: String,
    /// Server scope for `server__*` grants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_name: Option<String>,
    /// Shell command prefix the grant is scoped to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_prefix: Option<String>,
    /// Raw args-pattern the grant is scoped to (exclusive with
    /// `command_prefix`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_pattern: Option<String>,
    /// Whether the rule was also appended to the on-disk rule file.
    pub persist: bool,
}

/// Any event carried by the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum BusEvent {
    /// A call needs human confirmation.
    ConfirmationRequest(ConfirmationRequest),
    /// The human's answer.
    ConfirmationResponse(ConfirmationResponse),
    /// A policy grant was made.
    PolicyUpdate(PolicyUpdate),
}

impl BusEvent {
    /// The topic this event is routed on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ConfirmationRequest(_) => topics::TOOL_CONFIRMATION_REQUEST,
            Self::ConfirmationResponse(_) => topics::TOOL_CONFIRMATION_RESPONSE,
            Self::PolicyUpdate(_) => topics::UPDATE_POLICY,
        }
    }
}
