//! Memory tool — exposes the store to agent logic as a `memory` tool.
//!
//! Every answer carries a `{success, message | content | error}` object in
//! `data`, which is handed back to the model verbatim.

use agentgate_core::error::{MemoryError, ToolError};
use agentgate_core::tool::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::store::MemoryStore;

pub struct MemoryTool {
    store: MemoryStore,
}

impl MemoryTool {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    async fn run(&self, command: &str, args: &Value) -> Result<Reply, ToolError> {
        let path = || str_arg(args, "path");

        let reply = match command {
            "view" => {
                let range = match args.get("view_range") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(parse_range(v)?),
                };
                let path = path()?;
                self.store
                    .view(path, range)
                    .await
                    .map(|outcome| Reply::Content(outcome.render()))
            }
            "create" => {
                let path = path()?;
                let text = str_arg(args, "file_text")?;
                self.store
                    .create(path, text)
                    .await
                    .map(|()| Reply::Message(format!("File created successfully at {path}")))
            }
            "str_replace" => {
                let path = path()?;
                let old = str_arg(args, "old_str")?;
                let new = args.get("new_str").and_then(Value::as_str).unwrap_or("");
                self.store
                    .str_replace(path, old, new)
                    .await
                    .map(|()| Reply::Message(format!("File {path} has been edited")))
            }
            "insert" => {
                let path = path()?;
                let line = args
                    .get("insert_line")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ToolError::InvalidArguments("Missing 'insert_line' argument".into()))?;
                let text = str_arg(args, "insert_text")?;
                self.store
                    .insert(path, line as usize, text)
                    .await
                    .map(|()| Reply::Message(format!("Text inserted at line {line} in {path}")))
            }
            "delete" => {
                let path = path()?;
                self.store
                    .delete(path)
                    .await
                    .map(|()| Reply::Message(format!("Deleted {path}")))
            }
            "rename" => {
                let old = str_arg(args, "old_path")?;
                let new = str_arg(args, "new_path")?;
                self.store
                    .rename(old, new)
                    .await
                    .map(|()| Reply::Message(format!("Renamed {old} to {new}")))
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown memory command '{other}'"
                )));
            }
        };

        Ok(reply.unwrap_or_else(Reply::Error))
    }
}

enum Reply {
    Message(String),
    Content(String),
    Error(MemoryError),
}

impl Reply {
    fn into_result(self) -> ToolResult {
        match self {
            Self::Message(message) => ToolResult {
                success: true,
                data: Some(json!({ "success": true, "message": message })),
                output: message,
            },
            Self::Content(content) => ToolResult {
                success: true,
                data: Some(json!({ "success": true, "content": content })),
                output: content,
            },
            Self::Error(e) => {
                let error = e.to_string();
                ToolResult {
                    success: false,
                    data: Some(json!({ "success": false, "error": error })),
                    output: error,
                }
            }
        }
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

fn parse_range(value: &Value) -> Result<(usize, usize), ToolError> {
    let bad = || ToolError::InvalidArguments("'view_range' must be [start, end]".into());
    let items = value.as_array().filter(|a| a.len() == 2).ok_or_else(bad)?;
    let start = items[0].as_u64().ok_or_else(bad)?;
    let end = items[1].as_u64().ok_or_else(bad)?;
    Ok((start as usize, end as usize))
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Persistent notes shared across conversations. Commands: view, create, str_replace, insert, delete, rename. All paths start with the memory root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace", "insert", "delete", "rename"]
                },
                "path": {
                    "type": "string",
                    "description": format!("Memory path, e.g. {}/notes.md", self.store.marker())
                },
                "view_range": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "description": "Optional 1-indexed inclusive [start, end] line range"
                },
                "file_text": { "type": "string" },
                "old_str": {
                    "type": "string",
                    "description": "Exact text to replace; must occur exactly once"
                },
                "new_str": { "type": "string" },
                "insert_line": {
                    "type": "integer",
                    "description": "Line number the inserted text will occupy (1-indexed)"
                },
                "insert_text": { "type": "string" },
                "old_path": { "type": "string" },
                "new_path": { "type": "string" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        let reply = self.run(command, &arguments).await?;
        Ok(reply.into_result())
    }
}
