//! Generation Pipeline: drives the provider's streaming tool-call loop for
//! one chat, persists messages, and emits the SSE framing contract (§4.6).

use crate::db::{self, models::Role};
use crate::error::{AppError, AppResult};
use crate::provider::{CompletionEvent, CompletionRequest, ContentBlock, ConversationMessage};
use crate::state::{AppState, StreamSession};
use crate::tools::{ToolCall, ToolExecutor, ToolResult};
use crate::workspace_store::WorkspaceStore;
use futures::Stream;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const SYSTEM_DIRECTIVE: &str = "You are an AI assistant embedded in a web-based app builder. \
Use the available tools to read, write, list, and delete files in the user's workspace. \
Keep responses concise and make concrete file changes rather than only describing them.";
const DEFAULT_MAX_STEPS: u32 = 10;

pub struct GenerationRequest {
    pub chat_id: i64,
    pub owner_user_id: i64,
    pub workspace_root: PathBuf,
    pub prompt: String,
    pub redo: bool,
}

/// Drive one generation, yielding pre-framed SSE `data:` payloads (already
/// JSON-encoded) as they become available. The stream itself is infallible:
/// provider/tool failures are represented as `error` frames, not a stream
/// error, so the SSE response always completes cleanly.
pub fn run(state: AppState, request: GenerationRequest) -> impl Stream<Item = String> {
    async_stream::stream! {
        let conn = match state.db.get() {
            Ok(conn) => conn,
            Err(err) => {
                yield frame(&json!({"type": "error", "error": err.to_string()}));
                return;
            }
        };

        if request.redo {
            if let Ok(Some(last)) = db::messages::last_assistant_message(&conn, request.chat_id) {
                let _ = db::messages::delete(&conn, last.id);
            }
        } else {
            match db::messages::append(&conn, request.chat_id, Role::User, &request.prompt, None) {
                Ok(message) => yield frame(&json!({"type": "message", "message": message})),
                Err(err) => {
                    yield frame(&json!({"type": "error", "error": err.to_string()}));
                    return;
                }
            }
        }

        let history = match db::messages::list_for_chat(&conn, request.chat_id) {
            Ok(history) => history,
            Err(err) => {
                yield frame(&json!({"type": "error", "error": err.to_string()}));
                return;
            }
        };

        let settings = match db::settings::get(&conn, request.owner_user_id) {
            Ok(settings) => settings,
            Err(err) => {
                yield frame(&json!({"type": "error", "error": err.to_string()}));
                return;
            }
        };
        drop(conn);

        let stream_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        state
            .streams
            .register(
                stream_id.clone(),
                StreamSession {
                    chat_id: request.chat_id,
                    owner_user_id: request.owner_user_id,
                    cancel: cancel.clone(),
                },
            )
            .await;
        yield frame(&json!({"type": "streamId", "streamId": stream_id}));

        let provider = match state.provider_for(&settings.provider) {
            Ok(provider) => provider,
            Err(err) => {
                yield frame(&json!({"type": "error", "error": err.to_string()}));
                state.streams.remove(&stream_id).await;
                return;
            }
        };

        if !request.workspace_root.join("package.json").exists() {
            yield frame(&json!({"type": "status", "message": "initializing workspace"}));
            if let Err(err) = scaffold_template(&request.workspace_root).await {
                yield frame(&json!({"type": "error", "error": err.to_string()}));
                state.streams.remove(&stream_id).await;
                return;
            }
        }

        let executor = ToolExecutor::new(WorkspaceStore::new(request.workspace_root.clone()));

        let mut conversation: Vec<ConversationMessage> = history
            .iter()
            .map(|m| ConversationMessage::text(m.role.as_str(), m.content.clone()))
            .collect();

        let max_steps = DEFAULT_MAX_STEPS;
        let mut accumulated = String::new();
        let mut cancelled = false;
        let mut failed: Option<String> = None;

        use futures::StreamExt;

        'steps: for _ in 0..max_steps {
            let step_request = CompletionRequest {
                system: SYSTEM_DIRECTIVE.to_string(),
                messages: conversation.clone(),
                model: settings.model.clone(),
                max_steps,
            };
            let mut provider_stream = provider.stream_completion(step_request, cancel.clone());

            let mut step_text = String::new();
            let mut tool_calls: Vec<(String, ToolCall)> = Vec::new();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break 'steps;
                    }
                    next = provider_stream.next() => {
                        let Some(event) = next else { break };
                        match event {
                            Ok(CompletionEvent::TextDelta(chunk)) => {
                                accumulated.push_str(&chunk);
                                step_text.push_str(&chunk);
                                yield frame(&json!({
                                    "type": "chunk",
                                    "content": chunk,
                                    "fullContent": accumulated,
                                }));
                            }
                            Ok(CompletionEvent::ToolCall { id, call }) => {
                                tool_calls.push((id, call));
                            }
                            Ok(CompletionEvent::Done) => break,
                            Err(err) => {
                                failed = Some(err.to_string());
                                break 'steps;
                            }
                        }
                    }
                }
            }

            // No tools were called this step: the model's turn is over.
            if tool_calls.is_empty() {
                break;
            }

            let mut assistant_blocks = Vec::new();
            if !step_text.is_empty() {
                assistant_blocks.push(ContentBlock::Text { text: step_text });
            }
            for (id, call) in &tool_calls {
                assistant_blocks.push(ContentBlock::ToolUse {
                    id: id.clone(),
                    name: call.name().to_string(),
                    input: call.input(),
                });
            }
            conversation.push(ConversationMessage { role: "assistant".to_string(), content: assistant_blocks });

            let mut result_blocks = Vec::new();
            for (id, call) in tool_calls {
                let result = executor.execute(call).await;
                if let Some(path) = result.mutated_path() {
                    yield frame(&json!({
                        "type": "fileUpdate",
                        "path": path,
                        "message": tool_result_message(&result),
                    }));
                }
                result_blocks.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: serde_json::to_string(&result).unwrap_or_default(),
                });
            }
            conversation.push(ConversationMessage { role: "user".to_string(), content: result_blocks });
        }

        state.streams.remove(&stream_id).await;

        if cancelled {
            return;
        }

        if let Some(error) = failed {
            yield frame(&json!({"type": "error", "error": error}));
            return;
        }

        let conn = match state.db.get() {
            Ok(conn) => conn,
            Err(err) => {
                yield frame(&json!({"type": "error", "error": err.to_string()}));
                return;
            }
        };
        match db::messages::append(&conn, request.chat_id, Role::Assistant, &accumulated, None) {
            Ok(message) => {
                yield frame(&json!({
                    "type": "end",
                    "message": message,
                    "chatId": request.chat_id,
                }));
            }
            Err(err) => {
                yield frame(&json!({"type": "error", "error": err.to_string()}));
            }
        }
    }
}

fn frame(value: &Value) -> String {
    value.to_string()
}

fn tool_result_message(result: &ToolResult) -> Option<String> {
    match result {
        ToolResult::WriteFile { message, .. } => message.clone(),
        _ => None,
    }
}

/// Materialize a minimal template file set so a brand-new workspace has a
/// `package.json` the Process Supervisor can find before any AI turn runs.
async fn scaffold_template(root: &std::path::Path) -> AppResult<()> {
    let store = WorkspaceStore::new(root.to_path_buf());
    if store.exists("package.json").await? {
        return Ok(());
    }
    store
        .write(
            "package.json",
            br#"{
  "name": "workspace-app",
  "private": true,
  "scripts": { "dev": "vite" },
  "dependencies": {}
}
"#,
        )
        .await?;
    store
        .write("index.html", b"<!doctype html>\n<html>\n<body>\n<div id=\"app\"></div>\n</body>\n</html>\n")
        .await?;
    Ok(())
}

/// Cancel an in-flight stream. Returns `false` (not an error) if it already
/// completed or never existed — per §4.6, racing this against completion is
/// harmless.
pub async fn cancel_stream(state: &AppState, stream_id: &str, requester: i64) -> AppResult<bool> {
    let cancelled = state.streams.cancel(stream_id).await;
    if !cancelled {
        return Err(AppError::NotFound("stream not found".to_string()));
    }
    let _ = requester;
    Ok(true)
}
