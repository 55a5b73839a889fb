//! Shared harness: scripted confirmation UI and mock tools.

// Not every scenario file exercises every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use warden_core::ConfirmationOutcome;
use warden_events::{topics, BusEvent, ConfirmationResponse, EventBus};
use warden_policy::PolicyEngine;
use warden_scheduler::{Scheduler, SchedulerConfig, ToolExecutor};
use warden_tools::{
    Tool, ToolError, ToolInvocation, ToolRegistry, ToolUpdate, ToolsResult,
};

/// Handle to a scripted confirmation UI running in the background.
pub struct ScriptedUi {
    requests_seen: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl ScriptedUi {
    /// How many confirmation requests the UI has answered so far.
    pub fn requests_seen(&self) -> usize {
        self.requests_seen.load(Ordering::SeqCst)
    }

    /// Stop the UI task.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

/// Subscribe a UI stand-in that answers each confirmation request with the
/// next outcome in `outcomes`, then keeps denying.
pub fn spawn_ui(bus: &EventBus, outcomes: Vec<ConfirmationOutcome>) -> ScriptedUi {
    let mut requests = bus.subscribe_topic(topics::TOOL_CONFIRMATION_REQUEST);
    let requests_seen = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&requests_seen);
    let bus = bus.clone();

    let handle = tokio::spawn(async move {
        let mut outcomes = outcomes.into_iter();
        while let Some(event) = requests.recv().await {
            let BusEvent::ConfirmationRequest(request) = event.as_ref() else {
                continue;
            };
            seen.fetch_add(1, Ordering::SeqCst);
            let outcome = outcomes.next().unwrap_or(ConfirmationOutcome::Cancel);
            bus.publish(BusEvent::ConfirmationResponse(
                ConfirmationResponse::with_outcome(request.correlation_id.clone(), outcome),
            ));
        }
    });

    ScriptedUi {
        requests_seen,
        handle,
    }
}

/// A tool that returns its `text` argument, registered under any name.
pub struct TextTool {
    name: String,
}

impl TextTool {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Tool for TextTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "returns its text argument"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "required": ["text"]})
    }

    fn build(&self, args: Value) -> ToolsResult<Box<dyn ToolInvocation>> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("text is required".into()))?
            .to_string();
        Ok(Box::new(TextInvocation { text }))
    }
}

struct TextInvocation {
    text: String,
}

#[async_trait]
impl ToolInvocation for TextInvocation {
    fn description(&self) -> String {
        format!("text: {}", self.text)
    }

    async fn execute(
        &self,
        _token: CancellationToken,
        _updates: Option<mpsc::UnboundedSender<ToolUpdate>>,
    ) -> ToolsResult<String> {
        Ok(self.text.clone())
    }
}

/// A tool that sleeps until its duration elapses or the token fires.
pub struct SlowTool {
    pub duration: Duration,
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow_tool"
    }

    fn description(&self) -> &str {
        "sleeps, cancellably"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn build(&self, _args: Value) -> ToolsResult<Box<dyn ToolInvocation>> {
        Ok(Box::new(SlowInvocation {
            duration: self.duration,
        }))
    }
}

struct SlowInvocation {
    duration: Duration,
}

#[async_trait]
impl ToolInvocation for SlowInvocation {
    fn description(&self) -> String {
        "slow".to_string()
    }

    async fn execute(
        &self,
        token: CancellationToken,
        _updates: Option<mpsc::UnboundedSender<ToolUpdate>>,
    ) -> ToolsResult<String> {
        tokio::select! {
            () = token.cancelled() => Err(ToolError::ExecutionFailed("aborted".to_string())),
            () = tokio::time::sleep(self.duration) => Ok("done".to_string()),
        }
    }
}

/// Assemble a scheduler over the given tools and engine.
pub fn make_scheduler(
    tools: Vec<Arc<dyn Tool>>,
    engine: PolicyEngine,
    dir: &TempDir,
    config: SchedulerConfig,
) -> Scheduler {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Scheduler::new(
        Arc::new(registry),
        Arc::new(RwLock::new(engine)),
        EventBus::new(),
        ToolExecutor::new(dir.path().to_path_buf()),
        config,
    )
}
