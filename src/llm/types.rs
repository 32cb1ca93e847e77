use crate::error::LlmError;
use crate::store::MessageRole;
use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// One role/content pair of conversation context, in the wire shape the
/// chat-completions API expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Incremental output of a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta { text: String },
    Done,
}

pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// The external completion service: one blocking call, one streaming call.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request the next assistant reply for the given ordered context and
    /// wait for the full text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Request the next assistant reply as a stream of text fragments.
    /// Errors establishing the request surface here; mid-stream errors
    /// surface as `Err` items on the returned stream.
    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream, LlmError>;
}
