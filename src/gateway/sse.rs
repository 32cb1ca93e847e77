use crate::relay::TurnEvent;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use tokio::sync::mpsc;

/// Build the event-stream response for a streaming turn.
///
/// Each fragment becomes a `data: {"content": ...}` frame; the stream is
/// terminated by `data: [DONE]` once the relay reports persistence, or by
/// a `data: {"error": ...}` frame when the upstream fails mid-stream.
pub fn build_sse_response(mut rx: mpsc::Receiver<TurnEvent>) -> Response<Body> {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match event {
                TurnEvent::Fragment(text) => {
                    let payload = serde_json::json!({ "content": text });
                    yield Ok::<_, std::convert::Infallible>(format!("data: {payload}\n\n"));
                }
                TurnEvent::Done => {
                    yield Ok("data: [DONE]\n\n".to_string());
                    break;
                }
                TurnEvent::Failed(detail) => {
                    let payload = serde_json::json!({ "error": detail });
                    yield Ok(format!("data: {payload}\n\n"));
                    break;
                }
            }
        }
    };

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response.headers_mut().insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive"),
    );
    response
}
