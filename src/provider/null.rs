//! A scripted provider double, so the Generation Pipeline's control flow —
//! persistence ordering, SSE framing, cancellation — can be exercised without
//! a network call.

use super::{CompletionEvent, CompletionRequest, ModelProvider, ProviderError};
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

pub struct NullProvider {
    script: Vec<CompletionEvent>,
}

impl NullProvider {
    pub fn new(script: Vec<CompletionEvent>) -> Self {
        Self { script }
    }

    pub fn echoing_text(text: impl Into<String>) -> Self {
        Self::new(vec![CompletionEvent::TextDelta(text.into()), CompletionEvent::Done])
    }
}

impl ModelProvider for NullProvider {
    fn stream_completion(
        &self,
        _request: CompletionRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<CompletionEvent, ProviderError>> {
        let events = self.script.clone();
        stream::iter(events.into_iter().map(Ok))
            .take_while(move |_| {
                let cancelled = cancel.is_cancelled();
                async move { !cancelled }
            })
            .boxed()
    }
}
