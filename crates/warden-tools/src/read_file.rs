//! Read-file tool.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{Tool, ToolError, ToolInvocation, ToolUpdate, ToolsResult};

/// Built-in tool that reads a file from disk.
pub struct ReadFileTool;

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a file from the local filesystem and returns its contents."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path of the file to read"
                }
            },
            "required": ["path"]
        })
    }

    fn build(&self, args: Value) -> ToolsResult<Box<dyn ToolInvocation>> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("path is required".into()))?
            .to_string();

        if path.is_empty() {
            return Err(ToolError::InvalidArguments("path is empty".into()));
        }

        Ok(Box::new(ReadFileInvocation { path }))
    }
}

struct ReadFileInvocation {
    path: String,
}

#[async_trait]
impl ToolInvocation for ReadFileInvocation {
    fn description(&self) -> String {
        format!("read file: {}", self.path)
    }

    async fn execute(
        &self,
        _token: CancellationToken,
        _updates: Option<mpsc::UnboundedSender<ToolUpdate>>,
    ) -> ToolsResult<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }
}
