use super::sse::build_sse_response;
use super::types::{
    AnswerResponse, MessageView, MessagesResponse, ThreadListResponse, ThreadResponse, TravelQuery,
};
use super::AppState;
use crate::error::WayfarerError;
use crate::store::ThreadStore;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json},
};

/// Map a relay/store error onto the HTTP surface: missing threads are 404,
/// everything else (upstream, storage) is 500 with the error's detail.
fn error_response(error: &WayfarerError) -> (StatusCode, Json<serde_json::Value>) {
    if error.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"detail": "Thread not found"})),
        )
    } else {
        tracing::error!(error = %error, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"detail": error.to_string()})),
        )
    }
}

/// GET / — liveness greeting
pub(super) async fn handle_root() -> impl IntoResponse {
    Json(serde_json::json!({"message": "Hello, welcome to your Assistant API!"}))
}

/// POST /create-thread — new thread with its seed system message
pub(super) async fn handle_create_thread(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.create_thread(&state.system_prompt).await {
        Ok(thread) => (StatusCode::OK, Json(ThreadResponse::from(thread))).into_response(),
        Err(error) => error_response(&error.into()).into_response(),
    }
}

/// GET /threads — all threads, most recently active first
pub(super) async fn handle_list_threads(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_threads().await {
        Ok(threads) => Json(ThreadListResponse {
            threads: threads.into_iter().map(ThreadResponse::from).collect(),
        })
        .into_response(),
        Err(error) => error_response(&error.into()).into_response(),
    }
}

/// GET /thread/{thread_id}/messages — conversation in order
pub(super) async fn handle_get_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_messages(&thread_id).await {
        Ok(messages) => Json(MessagesResponse {
            messages: messages.into_iter().map(MessageView::from).collect(),
        })
        .into_response(),
        Err(error) => error_response(&error.into()).into_response(),
    }
}

/// DELETE /thread/{thread_id} — thread and messages go together
pub(super) async fn handle_delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_thread(&thread_id).await {
        Ok(()) => Json(serde_json::json!({"message": "Thread deleted successfully"}))
            .into_response(),
        Err(error) => error_response(&error.into()).into_response(),
    }
}

/// POST /travel-info — one conversational turn.
///
/// Callers that accept `text/event-stream` get the incremental relay;
/// everyone else waits for the full answer.
pub(super) async fn handle_travel_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(query): Json<TravelQuery>,
) -> impl IntoResponse {
    let wants_stream = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));

    if wants_stream {
        match state
            .relay
            .handle_turn_streaming(&query.thread_id, &query.question)
            .await
        {
            Ok(rx) => build_sse_response(rx).into_response(),
            Err(error) => error_response(&error).into_response(),
        }
    } else {
        match state.relay.handle_turn(&query.thread_id, &query.question).await {
            Ok(answer) => Json(AnswerResponse {
                response: answer,
                thread_id: query.thread_id,
            })
            .into_response(),
            Err(error) => error_response(&error).into_response(),
        }
    }
}
