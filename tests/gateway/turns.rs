//! Conversational turns end-to-end, with wiremock standing in for the
//! completion API.

use crate::server::TestServer;
use reqwest::StatusCode;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANSWER: &str = "It's in Paris, France.";

/// Mount the blocking completion mock (requests without `stream: true`).
async fn mount_blocking(upstream: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })))
        .mount(upstream)
        .await;
}

/// Mount the streaming completion mock for `stream: true` requests,
/// emitting `fragments` as separate SSE chunks.
async fn mount_streaming(upstream: &MockServer, fragments: &[&str]) {
    let mut body = String::from("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for fragment in fragments {
        let chunk = json!({"choices": [{"delta": {"content": fragment}}]});
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(upstream)
        .await;
}

async fn get_messages(client: &reqwest::Client, server: &TestServer, thread_id: &str) -> Vec<Value> {
    let response = client
        .get(server.url(&format!("/thread/{thread_id}/messages")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    body["messages"].as_array().unwrap().clone()
}

async fn thread_title(client: &reqwest::Client, server: &TestServer, thread_id: &str) -> String {
    let response = client.get(server.url("/threads")).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    body["threads"]
        .as_array()
        .unwrap()
        .iter()
        .find(|thread| thread["thread_id"] == thread_id)
        .expect("thread should be listed")["title"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn full_turn_answers_and_persists_conversation() {
    let upstream = MockServer::start().await;
    mount_blocking(&upstream, ANSWER).await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let thread_id = server.create_thread(&client).await;

    let response = client
        .post(server.url("/travel-info"))
        .json(&json!({"question": "Where is the Eiffel Tower?", "thread_id": thread_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["response"], ANSWER);
    assert_eq!(body["thread_id"], thread_id);

    let messages = get_messages(&client, &server, &thread_id).await;
    let pairs: Vec<(&str, &str)> = messages
        .iter()
        .map(|m| (m["role"].as_str().unwrap(), m["content"].as_str().unwrap()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("system", "You are a helpful travel documentation assistant."),
            ("user", "Where is the Eiffel Tower?"),
            ("assistant", ANSWER),
        ]
    );

    assert_eq!(thread_title(&client, &server, &thread_id).await, ANSWER);
}

#[tokio::test]
async fn second_turn_does_not_change_title() {
    let upstream = MockServer::start().await;
    // 60-char first reply forces truncation; the second reply differs.
    let long_reply = "a".repeat(60);
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": long_reply}}]
        })))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "A different reply."}}]
        })))
        .mount(&upstream)
        .await;

    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();
    let thread_id = server.create_thread(&client).await;

    for question in ["first question?", "second question?"] {
        let response = client
            .post(server.url("/travel-info"))
            .json(&json!({"question": question, "thread_id": thread_id}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let expected_title = format!("{}...", "a".repeat(50));
    assert_eq!(
        thread_title(&client, &server, &thread_id).await,
        expected_title
    );

    let messages = get_messages(&client, &server, &thread_id).await;
    assert_eq!(messages.len(), 5);
}

#[tokio::test]
async fn streaming_turn_relays_fragments_and_persists_concatenation() {
    let upstream = MockServer::start().await;
    let fragments = ["It's in ", "Paris, ", "France."];
    mount_streaming(&upstream, &fragments).await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let thread_id = server.create_thread(&client).await;

    let response = client
        .post(server.url("/travel-info"))
        .header("Accept", "text/event-stream")
        .json(&json!({"question": "Where is the Eiffel Tower?", "thread_id": thread_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let body = response.text().await.unwrap();
    assert!(body.ends_with("data: [DONE]\n\n"));

    let relayed: String = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| {
            let frame: Value = serde_json::from_str(data).unwrap();
            frame["content"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(relayed, ANSWER);

    // [DONE] is sent after persistence: the assistant message is already
    // there, as one message equal to the concatenation.
    let messages = get_messages(&client, &server, &thread_id).await;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[2]["content"], ANSWER);

    assert_eq!(thread_title(&client, &server, &thread_id).await, ANSWER);
}

#[tokio::test]
async fn turn_on_unknown_thread_is_404() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/travel-info"))
        .json(&json!({"question": "q", "thread_id": "never-created"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Thread not found");
}

#[tokio::test]
async fn upstream_failure_is_500_but_question_is_kept() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&upstream)
        .await;

    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();
    let thread_id = server.create_thread(&client).await;

    let response = client
        .post(server.url("/travel-info"))
        .json(&json!({"question": "lost question?", "thread_id": thread_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("502"));

    // The user's question survives the failed turn; no assistant reply,
    // no title change.
    let messages = get_messages(&client, &server, &thread_id).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "lost question?");
    assert_eq!(
        thread_title(&client, &server, &thread_id).await,
        "New Conversation"
    );
}

#[tokio::test]
async fn streaming_request_upstream_failure_is_500_before_any_stream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&upstream)
        .await;

    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();
    let thread_id = server.create_thread(&client).await;

    let response = client
        .post(server.url("/travel-info"))
        .header("Accept", "text/event-stream")
        .json(&json!({"question": "q", "thread_id": thread_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
