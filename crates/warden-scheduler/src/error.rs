use warden_core::CallId;
use warden_events::EventsError;

/// Errors from batch scheduling.
///
/// Per-call failures (unknown tool, invalid params, policy deny, tool
/// errors) never surface here — they resolve locally into a terminal call
/// status. Only batch-level failures reject a `schedule()` call.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The batch was cancelled before completing.
    #[error("batch cancelled")]
    Cancelled,

    /// The event bus failed while a call needed it.
    #[error("event bus failure: {0}")]
    Bus(String),

    /// The scheduler shut down while this batch was queued.
    #[error("scheduler shut down")]
    Closed,

    /// A status update violated the monotonic state machine.
    #[error("illegal status transition {from} -> {to} for {call_id}")]
    IllegalTransition {
        /// The call whose transition was rejected.
        call_id: CallId,
        /// Status before.
        from: &'static str,
        /// Requested status.
        to: &'static str,
    },

    /// A status update referenced a call outside the active batch.
    #[error("unknown call {0}")]
    UnknownCall(CallId),

    /// A modification handler failed to produce revised arguments.
    #[error("modification handler failed: {0}")]
    ModificationFailed(String),
}

impl From<EventsError> for SchedulerError {
    fn from(e: EventsError) -> Self {
        match e {
            EventsError::Aborted => Self::Cancelled,
            EventsError::BusClosed => Self::Bus("event bus closed".to_string()),
        }
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
