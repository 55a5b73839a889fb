//! Scheduler state: the active batch's calls and the single-writer status
//! entry point.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use warden_core::{
    CallId, CallStatus, CompletedToolCall, Timestamp, ToolCallRequest, ToolCallResponse,
};
use warden_tools::ToolUpdate;

use crate::error::{SchedulerError, SchedulerResult};

/// Observer notified after every status change, with a consistent snapshot
/// of the updated call.
pub type UpdateObserver = Arc<dyn Fn(&ToolCall) + Send + Sync>;

/// A tool call owned by the scheduler, from acceptance to terminal status.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// The original request.
    pub request: ToolCallRequest,
    /// What the invocation will do, for confirmation prompts.
    pub description: String,
    /// When the scheduler accepted the request.
    pub created_at: Timestamp,
    /// Current status. Mutated only via [`SchedulerState::update_status`].
    pub status: CallStatus,
    /// When the call reached a terminal status.
    pub completed_at: Option<Timestamp>,
}

impl ToolCall {
    /// A freshly accepted call, entering validation.
    #[must_use]
    pub fn new(request: ToolCallRequest, description: String) -> Self {
        Self {
            request,
            description,
            created_at: Timestamp::now(),
            status: CallStatus::Validating,
            completed_at: None,
        }
    }

    /// A call that failed before validation (unknown tool, build error):
    /// terminal immediately.
    #[must_use]
    pub fn failed(request: ToolCallRequest, response: ToolCallResponse) -> Self {
        Self {
            request,
            description: String::new(),
            created_at: Timestamp::now(),
            status: CallStatus::Error { response },
            completed_at: Some(Timestamp::now()),
        }
    }

    /// Whether the call has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Convert into the terminal snapshot returned to the caller.
    #[must_use]
    pub fn into_completed(self) -> CompletedToolCall {
        let completed_at = self.completed_at.unwrap_or_else(Timestamp::now);
        let status = if self.status.is_terminal() {
            self.status
        } else {
            CallStatus::Cancelled {
                reason: "batch ended before completion".to_string(),
            }
        };
        CompletedToolCall {
            request: self.request,
            status,
            created_at: self.created_at,
            completed_at,
        }
    }
}

/// Owner of the active batch's mutable call state.
///
/// All status mutation funnels through [`SchedulerState::update_status`],
/// which enforces the monotonic state machine and notifies the observer
/// with a consistent snapshot. The scheduler drives at most one call at a
/// time, so observers see calls complete in submission order.
pub struct SchedulerState {
    calls: Vec<ToolCall>,
    queued: VecDeque<CallId>,
    observer: Option<UpdateObserver>,
}

impl SchedulerState {
    /// Create empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            queued: VecDeque::new(),
            observer: None,
        }
    }

    /// Register a status observer.
    pub fn set_observer(&mut self, observer: UpdateObserver) {
        self.observer = Some(observer);
    }

    /// Install a new batch. Every call starts queued, in submission order.
    pub fn begin_batch(&mut self, calls: Vec<ToolCall>) {
        self.queued = calls.iter().map(|c| c.request.call_id.clone()).collect();
        self.calls = calls;
    }

    /// The calls of the active batch, in submission order.
    #[must_use]
    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    /// Look up a call by id.
    #[must_use]
    pub fn call(&self, id: &CallId) -> Option<&ToolCall> {
        self.calls.iter().find(|c| &c.request.call_id == id)
    }

    /// Pop the next queued call id.
    pub fn next_queued(&mut self) -> Option<CallId> {
        self.queued.pop_front()
    }

    /// The single entry point for status mutation.
    ///
    /// Rejects transitions the state machine forbids and stamps
    /// `completed_at` on terminal statuses. The observer is notified after
    /// the mutation, with the call in its new state.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownCall`] for ids outside the batch,
    /// [`SchedulerError::IllegalTransition`] for forbidden transitions.
    pub fn update_status(&mut self, id: &CallId, status: CallStatus) -> SchedulerResult<()> {
        let call = self
            .calls
            .iter_mut()
            .find(|c| &c.request.call_id == id)
            .ok_or_else(|| SchedulerError::UnknownCall(id.clone()))?;

        if !call.status.can_transition_to(&status) {
            return Err(SchedulerError::IllegalTransition {
                call_id: id.clone(),
                from: call.status.name(),
                to: status.name(),
            });
        }

        debug!(call_id = %id, from = call.status.name(), to = status.name(), "Status update");
        call.status = status;
        if call.status.is_terminal() {
            call.completed_at = Some(Timestamp::now());
        }
        if let Some(observer) = &self.observer {
            observer(call);
        }
        Ok(())
    }

    /// Merge a live update into an `Executing` payload without changing the
    /// discriminant. Updates arriving outside `Executing` are dropped.
    ///
    /// # Errors
    ///
    /// Same as [`SchedulerState::update_status`].
    pub fn patch_executing(&mut self, id: &CallId, update: &ToolUpdate) -> SchedulerResult<()> {
        let Some(call) = self.call(id) else {
            return Err(SchedulerError::UnknownCall(id.clone()));
        };
        let CallStatus::Executing { pid, live_output } = &call.status else {
            return Ok(());
        };
        let next = match update {
            ToolUpdate::Pid(new_pid) => CallStatus::Executing {
                pid: Some(*new_pid),
                live_output: live_output.clone(),
            },
            ToolUpdate::Output(chunk) => CallStatus::Executing {
                pid: *pid,
                live_output: Some(chunk.clone()),
            },
        };
        self.update_status(id, next)
    }

    /// Cancel every still-queued call and empty the queue.
    ///
    /// Used both for the user-Cancel cascade and for batch aborts; the
    /// in-flight call is not touched here.
    pub fn cancel_queued(&mut self, reason: &str) {
        let ids: Vec<CallId> = self.queued.drain(..).collect();
        for id in ids {
            if let Err(e) = self.update_status(
                &id,
                CallStatus::Cancelled {
                    reason: reason.to_string(),
                },
            ) {
                debug!(call_id = %id, error = %e, "Skipping cancel of settled call");
            }
        }
    }

    /// Whether every call in the batch is terminal.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.calls.iter().all(ToolCall::is_terminal)
    }

    /// Drain the batch into completed snapshots, clearing batch state.
    pub fn take_completed(&mut self) -> Vec<CompletedToolCall> {
        self.queued.clear();
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(ToolCall::into_completed)
            .collect()
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerState")
            .field("calls", &self.calls.len())
            .field("queued", &self.queued.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use warden_core::ToolCallResponse;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(
            ToolCallRequest::new(id, "read_file", json!({"path": "/tmp/x"})),
            "read file".to_string(),
        )
    }

    fn success() -> CallStatus {
        CallStatus::Success {
            response: ToolCallResponse::success("ok"),
        }
    }

    // -----------------------------------------------------------------------
    // Transitions through the single entry point
    // -----------------------------------------------------------------------

    #[test]
    fn test_update_status_happy_path() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a")]);
        let id = CallId::new("a");

        state.update_status(&id, CallStatus::Scheduled).unwrap();
        state
            .update_status(
                &id,
                CallStatus::Executing {
                    pid: None,
                    live_output: None,
                },
            )
            .unwrap();
        state.update_status(&id, success()).unwrap();

        let call = state.call(&id).unwrap();
        assert!(call.is_terminal());
        assert!(call.completed_at.is_some());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a")]);
        let id = CallId::new("a");

        // Success straight out of validation skips scheduling/execution.
        let result = state.update_status(&id, success());
        assert!(matches!(result, Err(SchedulerError::IllegalTransition { .. })));

        // No state is revisited.
        state.update_status(&id, CallStatus::Scheduled).unwrap();
        state
            .update_status(
                &id,
                CallStatus::Executing {
                    pid: None,
                    live_output: None,
                },
            )
            .unwrap();
        let result = state.update_status(&id, CallStatus::Scheduled);
        assert!(matches!(result, Err(SchedulerError::IllegalTransition { .. })));
    }

    #[test]
    fn test_unknown_call_rejected() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a")]);
        let result = state.update_status(&CallId::new("zzz"), CallStatus::Scheduled);
        assert!(matches!(result, Err(SchedulerError::UnknownCall(_))));
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a")]);
        let id = CallId::new("a");

        state
            .update_status(&id, CallStatus::Cancelled { reason: "x".into() })
            .unwrap();
        let result = state.update_status(&id, CallStatus::Scheduled);
        assert!(result.is_err());
    }

    // -----------------------------------------------------------------------
    // Executing payload patches
    // -----------------------------------------------------------------------

    #[test]
    fn test_patch_executing_merges_payload() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a")]);
        let id = CallId::new("a");
        state.update_status(&id, CallStatus::Scheduled).unwrap();
        state
            .update_status(
                &id,
                CallStatus::Executing {
                    pid: None,
                    live_output: None,
                },
            )
            .unwrap();

        state.patch_executing(&id, &ToolUpdate::Pid(42)).unwrap();
        state
            .patch_executing(&id, &ToolUpdate::Output("partial".into()))
            .unwrap();

        match &state.call(&id).unwrap().status {
            CallStatus::Executing { pid, live_output } => {
                assert_eq!(*pid, Some(42));
                assert_eq!(live_output.as_deref(), Some("partial"));
            },
            other => panic!("expected executing, got {other}"),
        }
    }

    #[test]
    fn test_patch_outside_executing_is_dropped() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a")]);
        let id = CallId::new("a");

        state.patch_executing(&id, &ToolUpdate::Pid(42)).unwrap();
        assert_eq!(state.call(&id).unwrap().status.name(), "validating");
    }

    // -----------------------------------------------------------------------
    // Queue and cascade
    // -----------------------------------------------------------------------

    #[test]
    fn test_queue_pops_in_submission_order() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a"), call("b"), call("c")]);
        assert_eq!(state.next_queued(), Some(CallId::new("a")));
        assert_eq!(state.next_queued(), Some(CallId::new("b")));
        assert_eq!(state.next_queued(), Some(CallId::new("c")));
        assert_eq!(state.next_queued(), None);
    }

    #[test]
    fn test_cancel_queued_leaves_popped_calls_alone() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a"), call("b"), call("c")]);
        let a = state.next_queued().unwrap();
        state.update_status(&a, CallStatus::Scheduled).unwrap();

        state.cancel_queued("cancelled by user");

        assert_eq!(state.call(&a).unwrap().status.name(), "scheduled");
        assert_eq!(state.call(&CallId::new("b")).unwrap().status.name(), "cancelled");
        assert_eq!(state.call(&CallId::new("c")).unwrap().status.name(), "cancelled");
        assert_eq!(state.next_queued(), None);
    }

    // -----------------------------------------------------------------------
    // Observer
    // -----------------------------------------------------------------------

    #[test]
    fn test_observer_sees_every_update() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let mut state = SchedulerState::new();
        state.set_observer(Arc::new(move |call: &ToolCall| {
            seen_clone
                .lock()
                .unwrap()
                .push(call.status.name().to_string());
        }));
        state.begin_batch(vec![call("a")]);
        let id = CallId::new("a");

        state.update_status(&id, CallStatus::Scheduled).unwrap();
        state
            .update_status(
                &id,
                CallStatus::Executing {
                    pid: None,
                    live_output: None,
                },
            )
            .unwrap();
        state.update_status(&id, success()).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["scheduled", "executing", "success"]
        );
    }

    // -----------------------------------------------------------------------
    // Completion snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn test_take_completed_preserves_order() {
        let mut state = SchedulerState::new();
        state.begin_batch(vec![call("a"), call("b")]);
        state
            .update_status(&CallId::new("a"), success())
            .unwrap();
        state
            .update_status(
                &CallId::new("b"),
                CallStatus::Cancelled { reason: "x".into() },
            )
            .unwrap();

        let completed = state.take_completed();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].request.call_id, CallId::new("a"));
        assert!(completed[0].is_success());
        assert!(completed[1].is_cancelled());
        assert!(state.calls().is_empty());
    }

    #[test]
    fn test_failed_call_is_terminal_immediately() {
        let failed = ToolCall::failed(
            ToolCallRequest::new("x", "nope", json!({})),
            ToolCallResponse::error(
                warden_core::ToolErrorType::ToolNotRegistered,
                "Tool \"nope\" not found.",
            ),
        );
        assert!(failed.is_terminal());
        assert!(failed.completed_at.is_some());
    }
}
