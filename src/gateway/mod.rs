//! Axum-based HTTP service boundary.
//!
//! Thread lifecycle routes and the conversational endpoint, with body
//! limits and CORS restricted to the configured UI origins. The request
//! timeout covers only the lifecycle routes; `/travel-info` must outlive
//! slow upstream streams.

mod handlers;
mod sse;
pub mod types;

use crate::config::Config;
use crate::llm::{CompletionClient, OpenAiClient};
use crate::relay::Relay;
use crate::store::{SqliteThreadStore, ThreadStore};
use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{delete, get, post},
};
use handlers::{
    handle_create_thread, handle_delete_thread, handle_get_messages, handle_list_threads,
    handle_root, handle_travel_info,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB) — prevents memory exhaustion
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s) for the thread lifecycle routes
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub store: Arc<dyn ThreadStore>,
    /// Seed system message content for new threads
    pub system_prompt: Arc<str>,
}

/// Run the HTTP gateway on the configured host/port.
pub async fn run_gateway(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    run_gateway_with_listener(listener, config).await
}

/// Run the HTTP gateway from a pre-bound listener (lets tests pick an
/// ephemeral port).
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    config: Config,
) -> Result<()> {
    let store = Arc::new(
        SqliteThreadStore::open(&config.database.path)
            .await
            .with_context(|| {
                format!("failed to open database {}", config.database.path.display())
            })?,
    );
    let store: Arc<dyn ThreadStore> = store;

    let client: Arc<dyn CompletionClient> = Arc::new(OpenAiClient::new(
        config.llm.api_key.as_deref(),
        &config.llm.base_url,
        &config.llm.model,
        config.llm.temperature,
    ));

    let state = AppState {
        relay: Arc::new(Relay::new(Arc::clone(&store), client)),
        store,
        system_prompt: Arc::from(config.llm.system_prompt.as_str()),
    };

    let app = build_router(state, &config.gateway.cors_allowed_origins)?;

    tracing::info!(
        addr = %listener.local_addr()?,
        model = %config.llm.model,
        db = %config.database.path.display(),
        "wayfarer listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState, cors_origins: &[String]) -> Result<Router> {
    let origins = cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    // Lifecycle routes get the request timeout; the conversational route
    // stays outside it (long-lived SSE responses).
    let lifecycle = Router::new()
        .route("/", get(handle_root))
        .route("/create-thread", post(handle_create_thread))
        .route("/threads", get(handle_list_threads))
        .route("/thread/{thread_id}/messages", get(handle_get_messages))
        .route("/thread/{thread_id}", delete(handle_delete_thread))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)));

    Ok(Router::new()
        .merge(lifecycle)
        .route("/travel-info", post(handle_travel_info))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(cors))
}
