//! Shell tool — executes commands with streamed output and cancellation.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Tool, ToolError, ToolInvocation, ToolUpdate, ToolsResult};

/// Default timeout in milliseconds (2 minutes).
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Maximum timeout in milliseconds (10 minutes).
const MAX_TIMEOUT_MS: u64 = 600_000;

/// Built-in tool for executing shell commands.
pub struct ShellTool;

impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Executes a shell command. Output is streamed while the command \
         runs. Optional timeout in milliseconds (max 600000)."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 120000, max: 600000)"
                }
            },
            "required": ["command"]
        })
    }

    fn is_shell(&self) -> bool {
        true
    }

    fn build(&self, args: Value) -> ToolsResult<Box<dyn ToolInvocation>> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("command is required".into()))?
            .to_string();

        if command.trim().is_empty() {
            return Err(ToolError::InvalidArguments("command is empty".into()));
        }

        let timeout_ms = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);

        Ok(Box::new(ShellInvocation {
            command,
            timeout_ms,
        }))
    }
}

/// A validated shell command awaiting execution.
struct ShellInvocation {
    command: String,
    timeout_ms: u64,
}

#[async_trait]
impl ToolInvocation for ShellInvocation {
    fn description(&self) -> String {
        format!("shell: {}", self.command)
    }

    async fn execute(
        &self,
        token: CancellationToken,
        updates: Option<mpsc::UnboundedSender<ToolUpdate>>,
    ) -> ToolsResult<String> {
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(self.timeout_ms),
            self.run(&token, updates.as_ref()),
        )
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(ToolError::Timeout(self.timeout_ms)),
        }
    }
}

impl ShellInvocation {
    async fn run(
        &self,
        token: &CancellationToken,
        updates: Option<&mpsc::UnboundedSender<ToolUpdate>>,
    ) -> ToolsResult<String> {
        let mut child = Command::new("bash")
            .arg("-c")
            .arg(&self.command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let (Some(pid), Some(tx)) = (child.id(), updates) {
            debug!(pid, command = %self.command, "Shell command started");
            let _ = tx.send(ToolUpdate::Pid(pid));
        }

        // Collect stderr concurrently so a chatty process can't fill the
        // pipe and stall while we drain stdout.
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
                buf
            })
        });

        let mut collected = String::new();
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        let _ = child.kill().await;
                        return Err(ToolError::ExecutionFailed("command aborted".into()));
                    },
                    line = lines.next_line() => match line? {
                        Some(line) => {
                            if let Some(tx) = updates {
                                let _ = tx.send(ToolUpdate::Output(line.clone()));
                            }
                            collected.push_str(&line);
                            collected.push('\n');
                        },
                        None => break,
                    },
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        let mut result_text = collected.trim_end().to_string();
        if !stderr.is_empty() {
            if !result_text.is_empty() {
                result_text.push('\n');
            }
            result_text.push_str("STDERR:\n");
            result_text.push_str(stderr.trim_end());
        }
        if let Some(code) = status.code().filter(|c| *c != 0) {
            if !result_text.is_empty() {
                result_text.push('\n');
            }
            result_text.push_str(&format!("(exit code: {code})"));
        }
        if result_text.is_empty() {
            result_text.push_str("(no output)");
        }

        Ok(result_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(args: Value) -> Box<dyn ToolInvocation> {
        ShellTool.build(args).unwrap()
    }

    #[test]
    fn test_build_requires_command() {
        assert!(ShellTool.build(serde_json::json!({})).is_err());
        assert!(ShellTool.build(serde_json::json!({"command": "  "})).is_err());
    }

    #[tokio::test]
    async fn test_echo() {
        let invocation = build(serde_json::json!({"command": "echo hello"}));
        let result = invocation
            .execute(CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(result.contains("hello"));
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let invocation = build(serde_json::json!({"command": "exit 42"}));
        let result = invocation
            .execute(CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(result.contains("exit code: 42"));
    }

    #[tokio::test]
    async fn test_stderr_captured() {
        let invocation = build(serde_json::json!({"command": "echo error >&2"}));
        let result = invocation
            .execute(CancellationToken::new(), None)
            .await
            .unwrap();
        assert!(result.contains("STDERR:"));
        assert!(result.contains("error"));
    }

    #[tokio::test]
    async fn test_streams_output_and_pid() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let invocation = build(serde_json::json!({"command": "echo one; echo two"}));
        invocation
            .execute(CancellationToken::new(), Some(tx))
            .await
            .unwrap();

        let mut saw_pid = false;
        let mut lines = Vec::new();
        while let Ok(update) = rx.try_recv() {
            match update {
                ToolUpdate::Pid(_) => saw_pid = true,
                ToolUpdate::Output(line) => lines.push(line),
            }
        }
        assert!(saw_pid);
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout() {
        let invocation = build(serde_json::json!({"command": "sleep 10", "timeout": 100}));
        let result = invocation.execute(CancellationToken::new(), None).await;
        assert!(matches!(result, Err(ToolError::Timeout(100))));
    }

    #[tokio::test]
    async fn test_cancellation_kills_command() {
        let token = CancellationToken::new();
        let invocation = build(serde_json::json!({"command": "sleep 10"}));

        let abort = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            abort.cancel();
        });

        let result = invocation.execute(token, None).await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed(_))));
    }
}
