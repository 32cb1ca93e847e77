use crate::store::{Message, MessageRole, Thread};
use serde::{Deserialize, Serialize};

/// Body of `POST /travel-info`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TravelQuery {
    pub question: String,
    pub thread_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Thread> for ThreadResponse {
    fn from(thread: Thread) -> Self {
        Self {
            thread_id: thread.id,
            title: thread.title,
            created_at: thread.created_at,
            updated_at: thread.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadListResponse {
    pub threads: Vec<ThreadResponse>,
}

/// Conversational view of a message: role and content only.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageView {
    pub role: MessageRole,
    pub content: String,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            role: message.role,
            content: message.content,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageView>,
}

/// Full-mode answer of `POST /travel-info`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub response: String,
    pub thread_id: String,
}
