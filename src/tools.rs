//! Tool Executor: the closed set of side-effecting tools the Generation
//! Pipeline's model loop may invoke, each bound to one workspace's store
//! (§4.5). Every result is structured — a failing tool never raises, so the
//! AI loop can observe the failure and adapt.

use crate::workspace_store::WorkspaceStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", content = "input", rename_all = "camelCase")]
pub enum ToolCall {
    WriteFile { path: String, content: String },
    ReadFile { path: String },
    ListFiles { path: Option<String> },
    DeleteFile { path: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
#[allow(clippy::large_enum_variant)]
pub enum ToolResult {
    WriteFile {
        success: bool,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ReadFile {
        success: bool,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ListFiles {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        files: Option<Vec<ListedFile>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    DeleteFile {
        success: bool,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ListedFile {
    pub name: String,
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
}

impl ToolCall {
    /// The wire name the provider used to request this call, for re-framing
    /// it as a `tool_use` content block when a multi-step turn continues.
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::WriteFile { .. } => "writeFile",
            ToolCall::ReadFile { .. } => "readFile",
            ToolCall::ListFiles { .. } => "listFiles",
            ToolCall::DeleteFile { .. } => "deleteFile",
        }
    }

    /// The call's arguments as the `input` object of a `tool_use` block.
    pub fn input(&self) -> Value {
        match self {
            ToolCall::WriteFile { path, content } => {
                serde_json::json!({ "path": path, "content": content })
            }
            ToolCall::ReadFile { path } => serde_json::json!({ "path": path }),
            ToolCall::ListFiles { path } => serde_json::json!({ "path": path }),
            ToolCall::DeleteFile { path } => serde_json::json!({ "path": path }),
        }
    }
}

impl ToolResult {
    /// The workspace-relative path touched by this call, if the result
    /// represents a successful mutation — used by the pipeline to emit
    /// `fileUpdate` frames (§4.6 step 8).
    pub fn mutated_path(&self) -> Option<&str> {
        match self {
            ToolResult::WriteFile { success: true, path, .. } => Some(path),
            ToolResult::DeleteFile { success: true, path, .. } => Some(path),
            _ => None,
        }
    }
}

pub struct ToolExecutor {
    store: WorkspaceStore,
}

impl ToolExecutor {
    pub fn new(store: WorkspaceStore) -> Self {
        Self { store }
    }

    pub async fn execute(&self, call: ToolCall) -> ToolResult {
        match call {
            ToolCall::WriteFile { path, content } => {
                match self.store.write(&path, content.as_bytes()).await {
                    Ok(()) => ToolResult::WriteFile {
                        success: true,
                        path,
                        message: Some("file written".to_string()),
                        error: None,
                    },
                    Err(err) => ToolResult::WriteFile {
                        success: false,
                        path,
                        message: None,
                        error: Some(err.to_string()),
                    },
                }
            }
            ToolCall::ReadFile { path } => match self.store.read(&path).await {
                Ok(bytes) => ToolResult::ReadFile {
                    success: true,
                    path,
                    content: Some(String::from_utf8_lossy(&bytes).into_owned()),
                    error: None,
                },
                Err(err) => ToolResult::ReadFile {
                    success: false,
                    path,
                    content: None,
                    error: Some(err.to_string()),
                },
            },
            ToolCall::ListFiles { path } => {
                let dir = path.unwrap_or_default();
                match self.store.list(&dir).await {
                    Ok(entries) => ToolResult::ListFiles {
                        success: true,
                        files: Some(
                            entries
                                .into_iter()
                                .map(|e| ListedFile { name: e.name, is_directory: e.is_directory })
                                .collect(),
                        ),
                        error: None,
                    },
                    Err(err) => ToolResult::ListFiles {
                        success: false,
                        files: None,
                        error: Some(err.to_string()),
                    },
                }
            }
            ToolCall::DeleteFile { path } => match self.store.delete(&path).await {
                Ok(()) => ToolResult::DeleteFile { success: true, path, error: None },
                Err(err) => ToolResult::DeleteFile {
                    success: false,
                    path,
                    error: Some(err.to_string()),
                },
            },
        }
    }
}

/// JSON Schemas advertised to the model provider for each tool (§4.6 step 6).
pub fn tool_schemas() -> Value {
    serde_json::json!([
        {
            "name": "writeFile",
            "description": "Write a file in the workspace, creating parent directories as needed.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }
        },
        {
            "name": "readFile",
            "description": "Read a file's contents from the workspace.",
            "input_schema": {
                "type": "object",
                "properties": { "path": {"type": "string"} },
                "required": ["path"]
            }
        },
        {
            "name": "listFiles",
            "description": "List files and directories at a workspace path (root if omitted).",
            "input_schema": {
                "type": "object",
                "properties": { "path": {"type": "string"} }
            }
        },
        {
            "name": "deleteFile",
            "description": "Delete a file or directory from the workspace.",
            "input_schema": {
                "type": "object",
                "properties": { "path": {"type": "string"} },
                "required": ["path"]
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips_through_the_tool_layer() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ToolExecutor::new(WorkspaceStore::new(dir.path().to_path_buf()));

        let write = executor
            .execute(ToolCall::WriteFile { path: "a.txt".to_string(), content: "hi".to_string() })
            .await;
        assert_eq!(write.mutated_path(), Some("a.txt"));

        let read = executor.execute(ToolCall::ReadFile { path: "a.txt".to_string() }).await;
        match read {
            ToolResult::ReadFile { success, content, .. } => {
                assert!(success);
                assert_eq!(content.unwrap(), "hi");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_missing_file_is_a_structured_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ToolExecutor::new(WorkspaceStore::new(dir.path().to_path_buf()));
        let result = executor.execute(ToolCall::ReadFile { path: "missing.txt".to_string() }).await;
        match result {
            ToolResult::ReadFile { success, error, .. } => {
                assert!(!success);
                assert!(error.is_some());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
