//! Warden Tools - Tool traits, registry, and built-in tools.
//!
//! A [`Tool`] validates arguments up front by building a
//! [`ToolInvocation`]; the invocation is what the executor later drives to
//! completion. Build failures surface as invalid-params errors before any
//! policy or confirmation work happens.
//!
//! The [`ToolRegistry`] resolves names and offers a "did you mean"
//! suggestion for unknown ones.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod read_file;
mod registry;
mod shell_tool;
mod truncate;

pub use error::{ToolError, ToolsResult};
pub use read_file::ReadFileTool;
pub use registry::ToolRegistry;
pub use shell_tool::ShellTool;
pub use truncate::{
    truncate_at_char_boundary, truncate_output, write_side_file, ShellOutputLimits,
    TruncatedOutput, MAX_OUTPUT_CHARS,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Incremental updates emitted by a running invocation.
#[derive(Debug, Clone)]
pub enum ToolUpdate {
    /// A chunk of live output (one line for line-oriented tools).
    Output(String),
    /// The process id, once a spawning tool knows it.
    Pid(u32),
}

/// A registered tool: metadata plus argument validation.
pub trait Tool: Send + Sync {
    /// Tool name. Remote-server tools use the `server__tool` qualified
    /// form.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments.
    fn input_schema(&self) -> Value;

    /// The declared server for remote tools.
    fn server_name(&self) -> Option<&str> {
        None
    }

    /// Whether this tool executes shell commands (its `command` argument is
    /// decomposed by the policy engine).
    fn is_shell(&self) -> bool {
        false
    }

    /// Validate `args` and build a ready-to-run invocation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] when the arguments do not
    /// satisfy the schema.
    fn build(&self, args: Value) -> ToolsResult<Box<dyn ToolInvocation>>;
}

/// One validated, ready-to-run call.
#[async_trait]
pub trait ToolInvocation: Send + Sync {
    /// What this invocation will do, for confirmation prompts.
    fn description(&self) -> String;

    /// Run to completion.
    ///
    /// Implementations watch `token` at their own suspension points and may
    /// emit [`ToolUpdate`]s through `updates` while running.
    ///
    /// # Errors
    ///
    /// Tool-reported failures; the executor maps them to a terminal error
    /// status with the declared kind.
    async fn execute(
        &self,
        token: CancellationToken,
        updates: Option<mpsc::UnboundedSender<ToolUpdate>>,
    ) -> ToolsResult<String>;
}
