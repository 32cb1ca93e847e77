//! Thread lifecycle over the HTTP surface.

use crate::server::TestServer;
use reqwest::StatusCode;
use serde_json::Value;
use wiremock::MockServer;

#[tokio::test]
async fn root_returns_greeting() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("Assistant API"));
}

#[tokio::test]
async fn created_thread_has_placeholder_title_and_seed_message() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/create-thread"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let thread: Value = response.json().await.unwrap();
    assert_eq!(thread["title"], "New Conversation");
    assert_eq!(thread["created_at"], thread["updated_at"]);
    let thread_id = thread["thread_id"].as_str().unwrap();

    let response = client
        .get(server.url(&format!("/thread/{thread_id}/messages")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "system");
}

#[tokio::test]
async fn list_threads_orders_by_recency() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let first = server.create_thread(&client).await;
    let second = server.create_thread(&client).await;

    let response = client.get(server.url("/threads")).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    let threads = body["threads"].as_array().unwrap();
    assert_eq!(threads.len(), 2);

    // Both were created in the same instant or newer-last; the listing is
    // non-increasing by updated_at, so the two ids are exactly ours.
    let ids: Vec<&str> = threads
        .iter()
        .map(|thread| thread["thread_id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&first.as_str()));
    assert!(ids.contains(&second.as_str()));
    let updated: Vec<&str> = threads
        .iter()
        .map(|thread| thread["updated_at"].as_str().unwrap())
        .collect();
    assert!(updated[0] >= updated[1]);
}

#[tokio::test]
async fn get_messages_unknown_thread_is_404() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(server.url("/thread/never-created/messages"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "Thread not found");
}

#[tokio::test]
async fn delete_thread_removes_it_and_its_messages() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let thread_id = server.create_thread(&client).await;

    let response = client
        .delete(server.url(&format!("/thread/{thread_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Thread deleted successfully");

    let response = client.get(server.url("/threads")).send().await.unwrap();
    let body: Value = response.json().await.unwrap();
    assert!(body["threads"].as_array().unwrap().is_empty());

    let response = client
        .get(server.url(&format!("/thread/{thread_id}/messages")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_unknown_thread_is_404() {
    let upstream = MockServer::start().await;
    let server = TestServer::start(&upstream.uri()).await;
    let client = reqwest::Client::new();

    let response = client
        .delete(server.url("/thread/never-created"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
