//! The confirmation driver: publish, await, and the edit-and-confirm loop.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_core::{ConfirmationOutcome, CorrelationId};
use warden_events::{
    topics, BusEvent, CallDetails, ConfirmationRequest, ConfirmationWaiter, EventBus,
};

use crate::error::SchedulerResult;

/// Collaborator that produces a revised invocation when the user chooses
/// to edit before deciding (e.g. by opening an editor).
#[async_trait]
pub trait ModificationHandler: Send + Sync {
    /// Produce revised arguments for the call.
    ///
    /// `payload` is whatever the UI attached to the `ModifyWithEditor`
    /// outcome (often a pre-edited argument object).
    ///
    /// # Errors
    ///
    /// Returns [`crate::SchedulerError::ModificationFailed`] when no
    /// revision could be produced.
    async fn modify(
        &self,
        details: &CallDetails,
        payload: Option<&Value>,
    ) -> SchedulerResult<Value>;
}

/// The settled result of a confirmation, after any edit loop.
#[derive(Debug, Clone)]
pub struct ConfirmationResolution {
    /// The user's final choice. Never `ModifyWithEditor` — edits loop back
    /// into confirmation until the user proceeds or cancels.
    pub outcome: ConfirmationOutcome,
    /// The revised arguments, when the invocation was edited.
    pub updated_args: Option<Value>,
}

/// Drive one call's confirmation to a settled outcome.
///
/// Publishes a confirmation request carrying serializable call details and
/// awaits the matching response. A `ModifyWithEditor` outcome invokes the
/// modification handler and re-enters confirmation with the edited details
/// under a fresh correlation id, so the human approves or denies the edited
/// version rather than the original.
///
/// When no listener is subscribed to the request topic, the request is
/// auto-denied — an unattended confirmation fails closed, not open.
///
/// # Errors
///
/// [`crate::SchedulerError::Cancelled`] when the token fires;
/// [`crate::SchedulerError::Bus`] when the bus shuts down mid-handshake.
pub async fn resolve_confirmation(
    bus: &EventBus,
    mut details: CallDetails,
    token: &CancellationToken,
    modify_handler: Option<&dyn ModificationHandler>,
) -> SchedulerResult<ConfirmationResolution> {
    let mut updated_args: Option<Value> = None;

    loop {
        if bus.topic_subscribers(topics::TOOL_CONFIRMATION_REQUEST) == 0 {
            warn!(call_id = %details.call_id, "No confirmation listener subscribed; auto-denying");
            return Ok(ConfirmationResolution {
                outcome: ConfirmationOutcome::Cancel,
                updated_args: None,
            });
        }

        let correlation_id = CorrelationId::new();
        // Subscribe before publishing so the response cannot race past us.
        let waiter = ConfirmationWaiter::subscribe(bus, correlation_id.clone(), token)?;
        bus.publish(BusEvent::ConfirmationRequest(ConfirmationRequest {
            correlation_id: correlation_id.clone(),
            details: details.clone(),
        }));
        debug!(correlation_id = %correlation_id, call_id = %details.call_id, "Awaiting confirmation");

        let result = waiter.wait().await?;
        match result.outcome {
            ConfirmationOutcome::ModifyWithEditor => {
                let Some(handler) = modify_handler else {
                    warn!(
                        call_id = %details.call_id,
                        "ModifyWithEditor without a modification handler; cancelling"
                    );
                    return Ok(ConfirmationResolution {
                        outcome: ConfirmationOutcome::Cancel,
                        updated_args: None,
                    });
                };
                let new_args = handler.modify(&details, result.payload.as_ref()).await?;
                details.args = new_args.clone();
                updated_args = Some(new_args);
                // Re-enter confirmation with the edited invocation.
            },
            outcome => {
                return Ok(ConfirmationResolution {
                    outcome,
                    updated_args,
                });
            },
        }
    }
}
