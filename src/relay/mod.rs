//! One conversational turn: append the user's question, replay the thread
//! to the completion service, reconcile the reply back into the store.

use crate::error::Result;
use crate::llm::{ChatMessage, CompletionClient, StreamEvent};
use crate::store::{MessageRole, ThreadStore};
use chrono::Utc;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Maximum characters of the first assistant reply kept as the thread title.
const TITLE_MAX_CHARS: usize = 50;

/// Outcome items of a streaming turn, in delivery order: zero or more
/// fragments, then exactly one `Done` (sent after the assistant message is
/// persisted) or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    Fragment(String),
    Done,
    Failed(String),
}

pub struct Relay {
    store: Arc<dyn ThreadStore>,
    client: Arc<dyn CompletionClient>,
}

impl Relay {
    pub fn new(store: Arc<dyn ThreadStore>, client: Arc<dyn CompletionClient>) -> Self {
        Self { store, client }
    }

    /// Full-mode turn: block until the complete answer is known, persist
    /// it, and return it.
    pub async fn handle_turn(&self, thread_id: &str, question: &str) -> Result<String> {
        let context = self.begin_turn(thread_id, question).await?;

        let answer = self.client.complete(&context).await?;
        let answer = answer.trim().to_string();

        let now = Utc::now().to_rfc3339();
        self.store
            .append_message(thread_id, MessageRole::Assistant, &answer, &now)
            .await?;
        Self::set_title_if_first_turn(self.store.as_ref(), thread_id, &answer, &now).await?;

        Ok(answer)
    }

    /// Streaming-mode turn: returns a channel of [`TurnEvent`]s. The
    /// upstream request is issued before returning, so connection failures
    /// surface as an `Err` here rather than inside the stream.
    ///
    /// The forwarding task is detached from the caller: dropping the
    /// receiver stops delivery but not accumulation, so the assistant
    /// message is still persisted once the upstream stream ends.
    pub async fn handle_turn_streaming(
        &self,
        thread_id: &str,
        question: &str,
    ) -> Result<mpsc::Receiver<TurnEvent>> {
        let context = self.begin_turn(thread_id, question).await?;
        let upstream = self.client.complete_streaming(&context).await?;

        let (tx, rx) = mpsc::channel(32);
        let store = Arc::clone(&self.store);
        let thread_id = thread_id.to_string();
        tokio::spawn(async move {
            forward_stream(store, thread_id, upstream, tx).await;
        });

        Ok(rx)
    }

    /// Steps 1-3 shared by both modes: existence check, durable user
    /// append + thread touch (kept even if the upstream call later
    /// fails), and history replay.
    async fn begin_turn(&self, thread_id: &str, question: &str) -> Result<Vec<ChatMessage>> {
        let now = Utc::now().to_rfc3339();
        self.store
            .append_message_and_touch(thread_id, MessageRole::User, question, &now)
            .await?;

        let history = self.store.get_messages(thread_id).await?;
        Ok(history
            .into_iter()
            .map(|message| ChatMessage::new(message.role, message.content))
            .collect())
    }

    /// One-shot title latch: fires only when the just-finished turn carried
    /// the thread's first user message. Racy under concurrent first turns
    /// on the same thread; accepted, appends stay independent rows.
    async fn set_title_if_first_turn(
        store: &dyn ThreadStore,
        thread_id: &str,
        answer: &str,
        timestamp: &str,
    ) -> Result<()> {
        if store.count_user_messages(thread_id).await? == 1 {
            let title = derive_title(answer);
            store
                .set_title_and_touch(thread_id, &title, timestamp)
                .await?;
            tracing::info!(thread_id, title, "derived thread title from first reply");
        }
        Ok(())
    }
}

/// Title = 50-char prefix of the reply, with `...` appended only when the
/// reply was longer.
fn derive_title(reply: &str) -> String {
    match reply.char_indices().nth(TITLE_MAX_CHARS) {
        Some((idx, _)) => format!("{}...", &reply[..idx]),
        None => reply.to_string(),
    }
}

/// Drives the upstream fragment stream: tees each fragment to the caller
/// while accumulating, then persists the accumulated reply as a single
/// assistant message and signals `Done` after persistence completes.
async fn forward_stream(
    store: Arc<dyn ThreadStore>,
    thread_id: String,
    mut upstream: crate::llm::CompletionStream,
    tx: mpsc::Sender<TurnEvent>,
) {
    let mut full_response = String::new();

    while let Some(event) = upstream.next().await {
        match event {
            Ok(StreamEvent::TextDelta { text }) => {
                full_response.push_str(&text);
                // Send failures mean the caller went away; keep accumulating.
                let _ = tx.send(TurnEvent::Fragment(text)).await;
            }
            Ok(StreamEvent::Done) => break,
            Err(error) => {
                tracing::warn!(thread_id, error = %error, "upstream stream failed mid-turn");
                let _ = tx.send(TurnEvent::Failed(error.to_string())).await;
                return;
            }
        }
    }

    let now = Utc::now().to_rfc3339();
    if let Err(error) = store
        .append_message(&thread_id, MessageRole::Assistant, &full_response, &now)
        .await
    {
        tracing::error!(thread_id, error = %error, "failed to persist streamed reply");
        let _ = tx.send(TurnEvent::Failed(error.to_string())).await;
        return;
    }

    if let Err(error) =
        Relay::set_title_if_first_turn(store.as_ref(), &thread_id, &full_response, &now).await
    {
        tracing::warn!(thread_id, error = %error, "title derivation failed after streamed turn");
    }

    let _ = tx.send(TurnEvent::Done).await;
}
