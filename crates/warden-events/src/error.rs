/// Errors from bus subscriptions and the confirmation protocol.
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    /// The abort signal fired before or while awaiting a response.
    #[error("confirmation aborted")]
    Aborted,

    /// The bus shut down while a response was still pending.
    #[error("event bus closed")]
    BusClosed,
}

/// Result type for bus and confirmation operations.
pub type EventsResult<T> = Result<T, EventsError>;
