//! Warden Events - Typed event bus and confirmation protocol.
//!
//! This crate decouples the scheduler from whatever UI (or absence of one)
//! answers confirmation requests:
//! - [`EventBus`] broadcasts [`BusEvent`]s to all subscribers, with
//!   per-topic subscriber accounting so publishers can fail closed when
//!   nobody is listening.
//! - [`await_confirmation`] correlates a confirmation response to its
//!   request by [`CorrelationId`](warden_core::CorrelationId), honouring
//!   cancellation and never leaking a subscription.
//! - [`PolicyUpdate`] messages let external consumers observe "always
//!   allow" grants as they are made.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bus;
pub mod confirmation;
/// Error types for bus and confirmation operations.
pub mod error;
pub mod message;

pub use bus::{EventBus, EventReceiver, DEFAULT_CHANNEL_CAPACITY};
pub use confirmation::{await_confirmation, ConfirmationResult, ConfirmationWaiter};
pub use error::{EventsError, EventsResult};
pub use message::{
    topics, BusEvent, CallDetails, ConfirmationRequest, ConfirmationResponse, PolicyUpdate,
};
