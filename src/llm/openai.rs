use super::sse::{DONE_SENTINEL, SseBuffer, parse_data_lines};
use super::types::{ChatMessage, CompletionClient, CompletionStream, StreamEvent};
use crate::error::LlmError;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible chat-completions client.
///
/// The base URL is configurable so tests can point it at a mock server.
pub struct OpenAiClient {
    /// Pre-computed `"Bearer <key>"` header value (avoids `format!` per request).
    cached_auth_header: Option<String>,
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        api_key: Option<&str>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
    ) -> Self {
        Self {
            cached_auth_header: api_key.map(|k| format!("Bearer {k}")),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .pool_max_idle_per_host(10)
                .pool_idle_timeout(std::time::Duration::from_secs(90))
                .tcp_keepalive(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
        }
    }

    fn build_request(&self, messages: &[ChatMessage], stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            stream: stream.then_some(true),
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        let auth_header = self.cached_auth_header.as_ref().ok_or(LlmError::Auth)?;

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", auth_header)
            .json(request)
            .send()
            .await
            .map_err(|error| LlmError::Request {
                message: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    fn extract_text(chat_response: ChatResponse) -> Result<String, LlmError> {
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::EmptyResponse("no choices in completion response".into()))
    }

    /// Text fragment carried by one streamed `data:` payload, if any.
    fn delta_text(data: &str) -> Option<String> {
        let chunk = serde_json::from_str::<ChatCompletionChunk>(data).ok()?;
        chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = self.build_request(messages, false);
        let response = self.send(&request).await?;

        let chat_response: ChatResponse =
            response.json().await.map_err(|error| LlmError::Request {
                message: format!("completion response JSON decode failed: {error}"),
            })?;

        Self::extract_text(chat_response)
    }

    async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
    ) -> Result<CompletionStream, LlmError> {
        let request = self.build_request(messages, true);
        let response = self.send(&request).await?;
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut sse_buffer = SseBuffer::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        yield Err(LlmError::Streaming(error.to_string()));
                        return;
                    }
                };
                sse_buffer.push_chunk(&chunk);

                while let Some(event_block) = sse_buffer.next_event_block() {
                    for data in parse_data_lines(&event_block) {
                        if data == DONE_SENTINEL {
                            yield Ok(StreamEvent::Done);
                            return;
                        }
                        if let Some(text) = Self::delta_text(data) {
                            yield Ok(StreamEvent::TextDelta { text });
                        }
                    }
                }
            }

            // Upstream closed without the sentinel; treat as a natural end.
            yield Ok(StreamEvent::Done);
        };

        Ok(Box::pin(stream))
    }
}
