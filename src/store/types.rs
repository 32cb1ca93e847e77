use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A persisted conversation. The title starts as a placeholder and is
/// rewritten once, from the first assistant reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub thread_id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: String,
}

/// Title given to every thread at creation, before the first exchange.
pub const PLACEHOLDER_TITLE: &str = "New Conversation";
