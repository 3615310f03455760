//! Model provider abstraction: turns "opaque streaming completion with tool
//! calls" (the only thing the Generation Pipeline needs from an AI backend,
//! per the spec's own non-goal on wire formats) into a concrete trait seam.
//!
//! [`AnthropicProvider`] is the real implementation, adapted from the
//! teacher's SSE line-parsing conventions. [`NullProvider`] is a scripted
//! test double so the Generation Pipeline's control flow can be tested
//! without a network call.

pub mod anthropic;
pub mod null;

use crate::tools::ToolCall;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// One block of a conversation message's content, matching the Anthropic
/// Messages API content-block shape so tool calls and their results can be
/// round-tripped into a follow-up request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ConversationMessage {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self { role: role.into(), content: vec![ContentBlock::Text { text: text.into() }] }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ConversationMessage>,
    pub model: String,
    pub max_steps: u32,
}

/// One unit of output from a provider's streaming loop. A single `stream_completion`
/// call drives exactly one model turn (one step); the Generation Pipeline
/// re-invokes the provider with the prior turn's tool calls and results
/// appended until the model stops calling tools or `max_steps` is reached.
#[derive(Debug, Clone)]
pub enum CompletionEvent {
    /// An incremental piece of assistant text.
    TextDelta(String),
    /// The model wants to invoke a tool, identified by the provider's own
    /// call id so the result can be attributed back to it.
    ToolCall { id: String, call: ToolCall },
    /// The model's turn finished and no further steps will run.
    Done,
}

#[derive(Debug, Clone)]
pub enum ProviderError {
    MissingCredential,
    Upstream(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::MissingCredential => write!(f, "missing credential for provider"),
            ProviderError::Upstream(msg) => write!(f, "upstream request failed: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

pub trait ModelProvider: Send + Sync {
    /// Stream a completion for `request`, cooperatively stopping as soon as
    /// `cancel` is triggered. Tool calls observed mid-stream are yielded as
    /// events; the caller (Generation Pipeline) is responsible for executing
    /// them and, if the provider protocol requires it, feeding results back
    /// in a follow-up call for the next step.
    fn stream_completion(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<CompletionEvent, ProviderError>>;
}
