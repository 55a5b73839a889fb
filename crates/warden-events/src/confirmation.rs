//! The confirmation protocol: correlating a human's answer to a request.
//!
//! The protocol publishes nothing itself — the caller publishes the
//! [`ConfirmationRequest`](crate::message::ConfirmationRequest) — and only
//! watches the response topic for a matching correlation id. Timeouts are
//! expressed purely as a deadline on the caller's cancellation token; there
//! is no timer logic here.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use warden_core::{ConfirmationOutcome, CorrelationId};

use crate::bus::{EventBus, EventReceiver};
use crate::error::{EventsError, EventsResult};
use crate::message::{topics, BusEvent};

/// A resolved confirmation: the user's choice plus any outcome payload.
#[derive(Debug, Clone)]
pub struct ConfirmationResult {
    /// The effective outcome.
    pub outcome: ConfirmationOutcome,
    /// Outcome-specific payload (e.g. edited arguments).
    pub payload: Option<Value>,
}

/// A live subscription awaiting one confirmation response.
///
/// Subscribe *before* publishing the request so the response cannot race
/// past the listener. The subscription ends when the waiter is consumed or
/// dropped — every exit path releases it.
pub struct ConfirmationWaiter {
    receiver: EventReceiver,
    correlation_id: CorrelationId,
    token: CancellationToken,
}

impl ConfirmationWaiter {
    /// Subscribe to the response topic for one correlation id.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::Aborted`] without subscribing when the token
    /// is already cancelled.
    pub fn subscribe(
        bus: &EventBus,
        correlation_id: CorrelationId,
        token: &CancellationToken,
    ) -> EventsResult<Self> {
        if token.is_cancelled() {
            return Err(EventsError::Aborted);
        }
        Ok(Self {
            receiver: bus.subscribe_topic(topics::TOOL_CONFIRMATION_RESPONSE),
            correlation_id,
            token: token.clone(),
        })
    }

    /// Wait for the first response matching this waiter's correlation id.
    ///
    /// Responses for other ids are ignored. Consumes the waiter, so the
    /// subscription is released on success, abort, and bus shutdown alike.
    ///
    /// # Errors
    ///
    /// [`EventsError::Aborted`] if the token fires first;
    /// [`EventsError::BusClosed`] if the bus shuts down.
    pub async fn wait(mut self) -> EventsResult<ConfirmationResult> {
        loop {
            tokio::select! {
                () = self.token.cancelled() => return Err(EventsError::Aborted),
                event = self.receiver.recv() => match event.as_deref() {
                    Some(BusEvent::ConfirmationResponse(resp))
                        if resp.correlation_id == self.correlation_id =>
                    {
                        trace!(correlation_id = %self.correlation_id, "Confirmation resolved");
                        return Ok(ConfirmationResult {
                            outcome: resp.resolved_outcome(),
                            payload: resp.payload.clone(),
                        });
                    },
                    Some(_) => {},
                    None => return Err(EventsError::BusClosed),
                },
            }
        }
    }
}

/// Await the confirmation response for `correlation_id`.
///
/// Convenience over [`ConfirmationWaiter`] for callers that have already
/// published their request (or publish from another task).
///
/// # Errors
///
/// See [`ConfirmationWaiter::subscribe`] and [`ConfirmationWaiter::wait`].
pub async fn await_confirmation(
    bus: &EventBus,
    correlation_id: CorrelationId,
    token: &CancellationToken,
) -> EventsResult<ConfirmationResult> {
    ConfirmationWaiter::subscribe(bus, correlation_id, token)?
        .wait()
        .await
}
