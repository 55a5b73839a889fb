//! Warden Scheduler - Batch orchestration for admission-checked tool calls.
//!
//! The [`Scheduler`] accepts one or more requested calls, serializes
//! batches (one batch at a time, later batches queue FIFO), and drives each
//! call through validation, policy check, confirmation, policy update, and
//! execution. Call status lives in the [`SchedulerState`] behind a single
//! `update_status` entry point, so observers always see consistent,
//! monotonic transitions.
//!
//! Cancellation is cooperative: every suspension point (safety checkers,
//! the confirmation handshake, tool execution) watches the same
//! cancellation token, and a user's Cancel on one call cascades to every
//! still-queued call in its batch.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod confirmation;
/// Error types for scheduler operations.
pub mod error;
pub mod executor;
pub mod hooks;
pub mod scheduler;
pub mod state;

pub use confirmation::{resolve_confirmation, ConfirmationResolution, ModificationHandler};
pub use error::{SchedulerError, SchedulerResult};
pub use executor::{CallUpdateHandler, OutputUpdateHandler, ToolExecutor};
pub use hooks::{HookDecision, ToolHooks};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use state::{SchedulerState, ToolCall, UpdateObserver};
