//! Anthropic Messages API client, implementing [`ModelProvider`] over SSE.
//!
//! The line-parsing shape — `data: <json>` frames keyed by `type`, text
//! accumulated from `content_block_delta`/`text_delta`, tool calls assembled
//! from `content_block_start`/`content_block_delta`/`input_json_delta` —
//! follows the same event vocabulary the teacher's traffic inspector parses,
//! adapted here to drive the pipeline instead of just logging it.

use super::{CompletionEvent, CompletionRequest, ModelProvider, ProviderError};
use crate::tools::{tool_schemas, ToolCall};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

impl ModelProvider for AnthropicProvider {
    fn stream_completion(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<CompletionEvent, ProviderError>> {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            run_stream(client, api_key, request, cancel, tx).await;
        });

        ReceiverStream::new(rx).boxed()
    }
}

async fn run_stream(
    client: reqwest::Client,
    api_key: String,
    request: CompletionRequest,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<CompletionEvent, ProviderError>>,
) {
    let body = json!({
        "model": request.model,
        "max_tokens": 8192,
        "system": request.system,
        "stream": true,
        "tools": tool_schemas(),
        "messages": request.messages,
    });

    let response = client
        .post(ANTHROPIC_API_URL)
        .header("x-api-key", &api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
        .send()
        .await;

    let response = match response {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            let status = resp.status();
            let _ = tx
                .send(Err(ProviderError::Upstream(format!("status {status}"))))
                .await;
            return;
        }
        Err(err) => {
            let _ = tx.send(Err(ProviderError::Upstream(err.to_string()))).await;
            return;
        }
    };

    let mut byte_stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut pending_tool: Option<(String, String, String)> = None; // (id, name, accumulated input json)

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            chunk = byte_stream.next() => {
                let Some(chunk) = chunk else { break };
                let Ok(chunk) = chunk else {
                    let _ = tx.send(Err(ProviderError::Upstream("stream read error".to_string()))).await;
                    return;
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(idx) = buffer.find('\n') {
                    let line = buffer[..idx].trim_end_matches('\r').to_string();
                    buffer.drain(..=idx);
                    if let Some(event) = parse_line(&line, &mut pending_tool) {
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    let _ = tx.send(Ok(CompletionEvent::Done)).await;
}

fn parse_line(
    line: &str,
    pending_tool: &mut Option<(String, String, String)>,
) -> Option<CompletionEvent> {
    let json_str = line.strip_prefix("data:")?.trim();
    if json_str.is_empty() || json_str == "[DONE]" {
        return None;
    }
    let data: Value = serde_json::from_str(json_str).ok()?;
    let event_type = data.get("type")?.as_str()?;

    match event_type {
        "content_block_start" => {
            let block = data.get("content_block")?;
            if block.get("type")?.as_str()? == "tool_use" {
                let id = block.get("id")?.as_str()?.to_string();
                let name = block.get("name")?.as_str()?.to_string();
                *pending_tool = Some((id, name, String::new()));
            }
            None
        }
        "content_block_delta" => {
            let delta = data.get("delta")?;
            match delta.get("type")?.as_str()? {
                "text_delta" => delta.get("text")?.as_str().map(|t| CompletionEvent::TextDelta(t.to_string())),
                "input_json_delta" => {
                    if let Some((_, _, acc)) = pending_tool.as_mut() {
                        if let Some(partial) = delta.get("partial_json").and_then(|v| v.as_str()) {
                            acc.push_str(partial);
                        }
                    }
                    None
                }
                _ => None,
            }
        }
        "content_block_stop" => {
            let (id, name, acc) = pending_tool.take()?;
            let input: Value = serde_json::from_str(&acc).unwrap_or(json!({}));
            let call_json = json!({ "name": name, "input": input });
            serde_json::from_value::<ToolCall>(call_json)
                .ok()
                .map(|call| CompletionEvent::ToolCall { id, call })
        }
        _ => None,
    }
}
