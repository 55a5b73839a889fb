//! Warden Core - Foundation types for the Warden admission-control pipeline.
//!
//! This crate provides the data model shared by the policy engine, the
//! confirmation protocol, and the scheduler:
//! - Identifier newtypes for calls, schedulers, and confirmation correlation
//! - The immutable [`ToolCallRequest`] submitted by callers
//! - The tagged-union [`CallStatus`] state machine and terminal
//!   [`CompletedToolCall`] snapshot
//! - The [`ConfirmationOutcome`] a human resolves a confirmation with
//! - The terminal error taxonomy ([`ToolErrorType`])
//!
//! No I/O and no concurrency state live here.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod ids;
pub mod outcome;
pub mod request;
pub mod status;
pub mod types;

pub use ids::{CallId, CorrelationId, SchedulerId};
pub use outcome::ConfirmationOutcome;
pub use request::ToolCallRequest;
pub use status::{CallStatus, CompletedToolCall, ToolCallResponse, ToolErrorType};
pub use types::{ApprovalMode, Timestamp};
