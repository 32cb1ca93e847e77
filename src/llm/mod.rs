pub mod openai;
pub mod sse;
pub mod types;

pub use openai::OpenAiClient;
pub use types::{ChatMessage, CompletionClient, CompletionStream, StreamEvent};
