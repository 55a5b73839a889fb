//! The tool executor: drives one approved invocation to completion.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_core::{CallId, CallStatus, ToolCallRequest, ToolCallResponse, ToolErrorType};
use warden_tools::{
    truncate_output, write_side_file, ShellOutputLimits, ToolInvocation, ToolUpdate,
};

use crate::hooks::ToolHooks;

/// Handler receiving incremental output chunks for a running call.
pub type OutputUpdateHandler = Arc<dyn Fn(&CallId, &str) + Send + Sync>;

/// Handler receiving live-call updates (pid, output) so the owner can patch
/// the call's `Executing` payload.
pub type CallUpdateHandler = Arc<dyn Fn(&CallId, &ToolUpdate) + Send + Sync>;

/// Runs one validated, approved invocation, handling streaming output,
/// truncation, and result-shape normalization.
pub struct ToolExecutor {
    hooks: Option<Arc<dyn ToolHooks>>,
    limits: ShellOutputLimits,
    side_file_dir: PathBuf,
}

impl ToolExecutor {
    /// Create an executor that persists truncated shell output under
    /// `side_file_dir`.
    #[must_use]
    pub fn new(side_file_dir: PathBuf) -> Self {
        Self {
            hooks: None,
            limits: ShellOutputLimits::default(),
            side_file_dir,
        }
    }

    /// Attach the hook collaborator fired around execution.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn ToolHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Override the shell output size limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ShellOutputLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Drive `invocation` to completion and return the terminal status.
    ///
    /// - A blocking before-hook short-circuits with a
    ///   policy-violation-shaped error.
    /// - If the token aborted during the call, the result is `Cancelled`
    ///   regardless of what the tool returned.
    /// - A tool-reported error becomes `Error` with the declared kind;
    ///   anything else is `Success`.
    /// - Shell output over the size limits is truncated inline with the
    ///   full output persisted to a side file; a side-file write failure
    ///   degrades to inline truncation and never fails the call.
    pub async fn execute(
        &self,
        request: &ToolCallRequest,
        invocation: &dyn ToolInvocation,
        is_shell: bool,
        token: &CancellationToken,
        output_update: Option<OutputUpdateHandler>,
        on_update: Option<CallUpdateHandler>,
    ) -> CallStatus {
        if let Some(hooks) = &self.hooks {
            let decision = hooks.fire_before_tool(&request.name, &request.args).await;
            if decision.blocked {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "blocked by hook".to_string());
                debug!(call_id = %request.call_id, reason, "Before-hook blocked execution");
                return CallStatus::Error {
                    response: ToolCallResponse::error(ToolErrorType::PolicyViolation, reason),
                };
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let exec = invocation.execute(token.clone(), Some(tx));
        tokio::pin!(exec);

        // Forward updates while the invocation runs.
        let mut updates_open = true;
        let result = loop {
            tokio::select! {
                result = &mut exec => break result,
                update = rx.recv(), if updates_open => {
                    match update {
                        Some(update) => self.forward_update(
                            request,
                            &update,
                            output_update.as_ref(),
                            on_update.as_ref(),
                        ),
                        None => updates_open = false,
                    }
                },
            }
        };
        // Deliver anything still buffered after completion.
        while let Ok(update) = rx.try_recv() {
            self.forward_update(request, &update, output_update.as_ref(), on_update.as_ref());
        }

        let status = if token.is_cancelled() {
            CallStatus::Cancelled {
                reason: "aborted during execution".to_string(),
            }
        } else {
            match result {
                Ok(output) => CallStatus::Success {
                    response: self.normalize_output(&request.call_id, output, is_shell),
                },
                Err(e) => CallStatus::Error {
                    response: ToolCallResponse::error(e.error_type(), e.to_string()),
                },
            }
        };

        if let Some(hooks) = &self.hooks
            && let CallStatus::Success { response } | CallStatus::Error { response } = &status
        {
            // Informational only; never affects the result.
            hooks
                .fire_after_tool(&request.name, &request.args, response)
                .await;
        }

        status
    }

    fn forward_update(
        &self,
        request: &ToolCallRequest,
        update: &ToolUpdate,
        output_update: Option<&OutputUpdateHandler>,
        on_update: Option<&CallUpdateHandler>,
    ) {
        if let Some(handler) = on_update {
            handler(&request.call_id, update);
        }
        if let (ToolUpdate::Output(chunk), Some(handler)) = (update, output_update) {
            handler(&request.call_id, chunk);
        }
    }

    /// Shape the tool's raw output into a response, applying truncation.
    fn normalize_output(&self, call_id: &CallId, output: String, is_shell: bool) -> ToolCallResponse {
        if !is_shell {
            return ToolCallResponse::success(truncate_output(output));
        }
        match write_side_file(&output, &self.limits, &self.side_file_dir, call_id) {
            Ok(truncated) => {
                let mut response = ToolCallResponse::success(truncated.content);
                if let Some(path) = truncated.output_file {
                    response = response.with_output_file(path);
                }
                response
            },
            Err(e) => {
                // Local resource trouble must not fail a successful call.
                warn!(call_id = %call_id, error = %e, "Side-file write failed; truncating inline");
                ToolCallResponse::success(truncate_output(output))
            },
        }
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("limits", &self.limits)
            .field("side_file_dir", &self.side_file_dir)
            .finish_non_exhaustive()
    }
}
