//! Batch orchestration: one batch at a time, calls driven in order.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_core::{
    CallId, CallStatus, CompletedToolCall, ConfirmationOutcome, ToolCallRequest,
    ToolCallResponse, ToolErrorType,
};
use warden_events::{BusEvent, CallDetails, EventBus, PolicyUpdate};
use warden_policy::store::command_prefix_pattern;
use warden_policy::{
    shell, PolicyDecision, PolicyEngine, PolicyRule, RuleFileEntry, RuleSource,
    SESSION_GRANT_PRIORITY,
};
use warden_tools::{Tool, ToolInvocation, ToolRegistry};

use crate::confirmation::{resolve_confirmation, ModificationHandler};
use crate::error::{SchedulerError, SchedulerResult};
use crate::executor::{CallUpdateHandler, OutputUpdateHandler, ToolExecutor};
use crate::state::{SchedulerState, ToolCall, UpdateObserver};

/// Construction-time options for a [`Scheduler`].
#[derive(Default)]
pub struct SchedulerConfig {
    /// File that "always allow and save" grants are appended to.
    pub user_rule_file: Option<PathBuf>,
    /// Handler invoked when a confirmation resolves to `ModifyWithEditor`.
    pub modify_handler: Option<Arc<dyn ModificationHandler>>,
    /// Receiver for live output chunks of streaming tools.
    pub output_update: Option<OutputUpdateHandler>,
    /// Observer notified on every status change.
    pub observer: Option<UpdateObserver>,
}

/// The batch scheduler.
///
/// Accepts requested calls, serializes batches (later `schedule` calls
/// queue FIFO behind the active batch), and drives each call through
/// validation, policy check, confirmation, policy update, and execution.
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    registry: Arc<ToolRegistry>,
    policy: Arc<RwLock<PolicyEngine>>,
    bus: EventBus,
    executor: ToolExecutor,
    state: Arc<Mutex<SchedulerState>>,
    run_state: Mutex<RunState>,
    active_token: Mutex<Option<CancellationToken>>,
    user_rule_file: Option<PathBuf>,
    modify_handler: Option<Arc<dyn ModificationHandler>>,
    output_update: Option<OutputUpdateHandler>,
}

struct RunState {
    running: bool,
    cancelling: bool,
    queue: VecDeque<QueuedBatch>,
}

struct QueuedBatch {
    requests: Vec<ToolCallRequest>,
    token: CancellationToken,
    responder: oneshot::Sender<SchedulerResult<Vec<CompletedToolCall>>>,
}

/// The live invocation for a call being driven.
struct StoredCall {
    tool: Arc<dyn Tool>,
    invocation: Box<dyn ToolInvocation>,
}

enum CallOutcome {
    Continue,
    CancelBatch,
}

enum Gate {
    Run(Vec<ToolCallRequest>, CancellationToken),
    Wait(oneshot::Receiver<SchedulerResult<Vec<CompletedToolCall>>>),
}

// Lock poisoning only happens if a holder panicked; the state is still
// consistent because critical sections never await.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: Arc<RwLock<PolicyEngine>>,
        bus: EventBus,
        executor: ToolExecutor,
        config: SchedulerConfig,
    ) -> Self {
        let mut state = SchedulerState::new();
        if let Some(observer) = config.observer {
            state.set_observer(observer);
        }
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                policy,
                bus,
                executor,
                state: Arc::new(Mutex::new(state)),
                run_state: Mutex::new(RunState {
                    running: false,
                    cancelling: false,
                    queue: VecDeque::new(),
                }),
                active_token: Mutex::new(None),
                user_rule_file: config.user_rule_file,
                modify_handler: config.modify_handler,
                output_update: config.output_update,
            }),
        }
    }

    /// The bus confirmations and policy updates travel on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Schedule a batch of calls and resolve with their terminal snapshots.
    ///
    /// If a batch is already active, this batch queues behind it (FIFO) and
    /// the returned future resolves when it eventually runs. Within a
    /// batch, calls are driven strictly one at a time in submission order.
    ///
    /// # Errors
    ///
    /// Per-call failures resolve into terminal call statuses, never into an
    /// `Err` here. Only batch-level failures reject: [`SchedulerError::Bus`]
    /// for bus breakdown and [`SchedulerError::Cancelled`] when
    /// [`Scheduler::cancel_all`] rejects a still-queued batch.
    pub async fn schedule(
        &self,
        requests: Vec<ToolCallRequest>,
        token: CancellationToken,
    ) -> SchedulerResult<Vec<CompletedToolCall>> {
        let gate = {
            let mut run = lock(&self.inner.run_state);
            if run.running {
                let (tx, rx) = oneshot::channel();
                run.queue.push_back(QueuedBatch {
                    requests,
                    token,
                    responder: tx,
                });
                Gate::Wait(rx)
            } else {
                run.running = true;
                Gate::Run(requests, token)
            }
        };

        match gate {
            Gate::Wait(rx) => rx.await.map_err(|_| SchedulerError::Closed)?,
            Gate::Run(requests, token) => {
                let result = self.run_batch(requests, token).await;
                self.drain_queue();
                result
            },
        }
    }

    /// Cancel everything: reject every queued batch with a cancellation
    /// error and abort the active batch (its in-flight call and queued
    /// siblings settle as `cancelled`). Idempotent; a second concurrent
    /// call returns immediately.
    pub fn cancel_all(&self) {
        {
            let mut run = lock(&self.inner.run_state);
            if run.cancelling {
                return;
            }
            run.cancelling = true;
            for batch in run.queue.drain(..) {
                let _ = batch.responder.send(Err(SchedulerError::Cancelled));
            }
        }
        if let Some(token) = lock(&self.inner.active_token).clone() {
            token.cancel();
        }
        lock(&self.inner.run_state).cancelling = false;
    }

    /// Pull the next queued batch, or mark the scheduler idle.
    fn drain_queue(&self) {
        let next = {
            let mut run = lock(&self.inner.run_state);
            match run.queue.pop_front() {
                Some(batch) => Some(batch),
                None => {
                    run.running = false;
                    None
                },
            }
        };
        if let Some(batch) = next {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let result = scheduler.run_batch(batch.requests, batch.token).await;
                let _ = batch.responder.send(result);
                scheduler.drain_queue();
            });
        }
    }

    async fn run_batch(
        &self,
        requests: Vec<ToolCallRequest>,
        token: CancellationToken,
    ) -> SchedulerResult<Vec<CompletedToolCall>> {
        // A child token lets cancel_all abort this batch without touching
        // the caller's own token.
        let batch_token = token.child_token();
        *lock(&self.inner.active_token) = Some(batch_token.clone());
        let result = self.run_batch_inner(requests, &batch_token).await;
        *lock(&self.inner.active_token) = None;
        result
    }

    async fn run_batch_inner(
        &self,
        requests: Vec<ToolCallRequest>,
        token: &CancellationToken,
    ) -> SchedulerResult<Vec<CompletedToolCall>> {
        // Resolve tools and build invocations; failures are terminal
        // immediately but never stop their siblings.
        let mut stored: HashMap<CallId, StoredCall> = HashMap::new();
        let mut calls = Vec::with_capacity(requests.len());
        for request in requests {
            match self.inner.registry.get_tool(&request.name) {
                None => {
                    let message = match self.inner.registry.suggest(&request.name) {
                        Some(suggestion) => format!(
                            "Tool \"{}\" not found. Did you mean \"{suggestion}\"?",
                            request.name
                        ),
                        None => format!("Tool \"{}\" not found.", request.name),
                    };
                    calls.push(ToolCall::failed(
                        request,
                        ToolCallResponse::error(ToolErrorType::ToolNotRegistered, message),
                    ));
                },
                Some(tool) => match tool.build(request.args.clone()) {
                    Err(e) => calls.push(ToolCall::failed(
                        request,
                        ToolCallResponse::error(e.error_type(), e.to_string()),
                    )),
                    Ok(invocation) => {
                        let call = ToolCall::new(request, invocation.description());
                        stored.insert(
                            call.request.call_id.clone(),
                            StoredCall { tool, invocation },
                        );
                        calls.push(call);
                    },
                },
            }
        }
        lock(&self.inner.state).begin_batch(calls);

        loop {
            if token.is_cancelled() {
                lock(&self.inner.state).cancel_queued("batch aborted");
                break;
            }
            let Some(call_id) = lock(&self.inner.state).next_queued() else {
                break;
            };
            let already_terminal = lock(&self.inner.state)
                .call(&call_id)
                .is_some_and(ToolCall::is_terminal);
            if already_terminal {
                continue;
            }
            match self.drive_call(&call_id, &mut stored, token).await? {
                CallOutcome::Continue => {},
                CallOutcome::CancelBatch => {
                    lock(&self.inner.state).cancel_queued("cancelled by user");
                },
            }
        }

        Ok(lock(&self.inner.state).take_completed())
    }

    /// Drive one call, classifying any failure that escapes the pipeline.
    async fn drive_call(
        &self,
        call_id: &CallId,
        stored: &mut HashMap<CallId, StoredCall>,
        token: &CancellationToken,
    ) -> SchedulerResult<CallOutcome> {
        match self.drive_call_inner(call_id, stored, token).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if token.is_cancelled() || matches!(e, SchedulerError::Cancelled) => {
                let _ = self.update_status(
                    call_id,
                    CallStatus::Cancelled {
                        reason: "aborted".to_string(),
                    },
                );
                Ok(CallOutcome::Continue)
            },
            Err(e @ (SchedulerError::Bus(_) | SchedulerError::Closed)) => Err(e),
            Err(e) => {
                warn!(call_id = %call_id, error = %e, "Unhandled pipeline failure");
                let _ = self.update_status(
                    call_id,
                    CallStatus::Error {
                        response: ToolCallResponse::error(
                            ToolErrorType::UnhandledException,
                            e.to_string(),
                        ),
                    },
                );
                Ok(CallOutcome::Continue)
            },
        }
    }

    async fn drive_call_inner(
        &self,
        call_id: &CallId,
        stored: &mut HashMap<CallId, StoredCall>,
        token: &CancellationToken,
    ) -> SchedulerResult<CallOutcome> {
        let (mut request, description) = {
            let state = lock(&self.inner.state);
            let call = state
                .call(call_id)
                .ok_or_else(|| SchedulerError::UnknownCall(call_id.clone()))?;
            (call.request.clone(), call.description.clone())
        };
        let tool = Arc::clone(
            &stored
                .get(call_id)
                .ok_or_else(|| SchedulerError::UnknownCall(call_id.clone()))?
                .tool,
        );
        let server_ctx = tool.server_name().map(str::to_string);

        // Admission check. Safety checkers may suspend, so the check races
        // the cancellation signal like every other suspension point.
        let check = tokio::select! {
            () = token.cancelled() => return Err(SchedulerError::Cancelled),
            check = async {
                let engine = self.inner.policy.read().await;
                engine.check(&request, server_ctx.as_deref()).await
            } => check,
        };
        debug!(call_id = %call_id, decision = %check.decision, "Policy check");

        match check.decision {
            PolicyDecision::Deny => {
                let detail = check
                    .rule
                    .as_ref()
                    .map(|r| format!(" (rule: {r})"))
                    .unwrap_or_default();
                self.update_status(
                    call_id,
                    CallStatus::Error {
                        response: ToolCallResponse::error(
                            ToolErrorType::PolicyViolation,
                            format!("Tool call denied by policy{detail}"),
                        ),
                    },
                )?;
                return Ok(CallOutcome::Continue);
            },
            PolicyDecision::AskUser => {
                let details = CallDetails {
                    call_id: call_id.clone(),
                    tool_name: request.name.clone(),
                    server_name: server_ctx.clone(),
                    args: request.args.clone(),
                    description,
                };
                let resolution = resolve_confirmation(
                    &self.inner.bus,
                    details,
                    token,
                    self.inner.modify_handler.as_deref(),
                )
                .await?;

                match resolution.outcome {
                    ConfirmationOutcome::Cancel => {
                        self.update_status(
                            call_id,
                            CallStatus::Cancelled {
                                reason: "cancelled by user".to_string(),
                            },
                        )?;
                        // The user's "no" aborts the rest of the batch.
                        return Ok(CallOutcome::CancelBatch);
                    },
                    outcome => {
                        if let Some(new_args) = resolution.updated_args {
                            match tool.build(new_args.clone()) {
                                Ok(invocation) => {
                                    if let Some(entry) = stored.get_mut(call_id) {
                                        entry.invocation = invocation;
                                    }
                                    request.args = new_args;
                                },
                                Err(e) => {
                                    self.update_status(
                                        call_id,
                                        CallStatus::Error {
                                            response: ToolCallResponse::error(
                                                e.error_type(),
                                                e.to_string(),
                                            ),
                                        },
                                    )?;
                                    return Ok(CallOutcome::Continue);
                                },
                            }
                        }
                        self.apply_outcome(outcome, &request, tool.as_ref()).await;
                    },
                }
            },
            PolicyDecision::Allow => {},
        }

        // Approved: hand to the executor.
        self.update_status(call_id, CallStatus::Scheduled)?;
        self.update_status(
            call_id,
            CallStatus::Executing {
                pid: None,
                live_output: None,
            },
        )?;

        let state_for_updates = Arc::clone(&self.inner.state);
        let on_update: CallUpdateHandler = Arc::new(move |id, update| {
            if let Err(e) = lock(&state_for_updates).patch_executing(id, update) {
                debug!(call_id = %id, error = %e, "Dropped live update");
            }
        });

        let entry = stored
            .get(call_id)
            .ok_or_else(|| SchedulerError::UnknownCall(call_id.clone()))?;
        let status = self
            .inner
            .executor
            .execute(
                &request,
                entry.invocation.as_ref(),
                tool.is_shell(),
                token,
                self.inner.output_update.clone(),
                Some(on_update),
            )
            .await;
        self.update_status(call_id, status)?;
        Ok(CallOutcome::Continue)
    }

    /// Synthesize and publish the policy rule a Proceed* outcome grants.
    async fn apply_outcome(
        &self,
        outcome: ConfirmationOutcome,
        request: &ToolCallRequest,
        tool: &dyn Tool,
    ) {
        if !outcome.creates_rule() {
            return;
        }

        let mut update = PolicyUpdate {
            tool_name: request.name.clone(),
            mcp_name: None,
            command_prefix: None,
            args_pattern: None,
            persist: outcome.persists_rule(),
        };

        let mut rule = PolicyRule::new(
            PolicyDecision::Allow,
            SESSION_GRANT_PRIORITY,
            RuleSource::SessionGrant,
        );
        match outcome {
            ConfirmationOutcome::ProceedAlwaysServer => match tool.server_name() {
                Some(server) => {
                    update.mcp_name = Some(server.to_string());
                    rule = rule.for_tool(format!("{server}__*"));
                },
                None => rule = rule.for_tool(request.name.clone()),
            },
            ConfirmationOutcome::ProceedAlwaysTool => {
                rule = rule.for_tool(request.name.clone());
            },
            _ => {
                rule = rule.for_tool(request.name.clone());
                // Shell grants are scoped to the command's root, so
                // approving `git status` covers `git …`, not every command.
                if tool.is_shell()
                    && let Some(command) = request.args.get("command").and_then(Value::as_str)
                    && let Some(root) = shell::command_root(command)
                {
                    match rule.clone().with_args_pattern(&command_prefix_pattern(&root)) {
                        Ok(scoped) => {
                            rule = scoped;
                            update.command_prefix = Some(root);
                        },
                        Err(e) => warn!(error = %e, "Failed to scope grant to command prefix"),
                    }
                }
            },
        }

        debug!(rule = %rule, outcome = %outcome, "Granting policy rule");
        self.inner.policy.write().await.add_rule(rule);

        if update.persist {
            if let Some(path) = &self.inner.user_rule_file {
                let entry = RuleFileEntry {
                    tool_name: Some(update.tool_name.clone()),
                    mcp_name: update.mcp_name.clone(),
                    decision: PolicyDecision::Allow,
                    priority: SESSION_GRANT_PRIORITY,
                    command_prefix: update.command_prefix.clone(),
                    args_pattern: None,
                    allow_redirection: false,
                };
                if let Err(e) = warden_policy::append_rule(path, entry) {
                    // Disk trouble degrades to an in-memory grant.
                    warn!(error = %e, "Failed to persist granted rule");
                }
            } else {
                warn!("ProceedAlwaysAndSave with no user rule file configured");
            }
        }

        self.inner.bus.publish(BusEvent::PolicyUpdate(update));
    }

    fn update_status(&self, id: &CallId, status: CallStatus) -> SchedulerResult<()> {
        lock(&self.inner.state).update_status(id, status)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let run = lock(&self.inner.run_state);
        f.debug_struct("Scheduler")
            .field("running", &run.running)
            .field("queued_batches", &run.queue.len())
            .finish_non_exhaustive()
    }
}
