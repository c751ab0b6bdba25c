//! Chat gateway — Axum-based HTTP server for the widget
//!
//! Owns the process-root [`CompletionFacade`]; every request handler borrows
//! it through shared state, so all requests without an explicit key reuse
//! the same vendor client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use studi_core::{CompletionFacade, CompletionOptions, Message};

use crate::relay::{self, estimate_tokens};

/// Temperature the widget chats at unless the request overrides it
const CHAT_TEMPERATURE: f32 = 0.2;

/// Shared state for all chat requests
#[derive(Clone)]
pub struct ChatState {
    pub facade: Arc<CompletionFacade>,
    pub show_usage: bool,
    pub start_time: std::time::Instant,
}

/// The gateway server
pub struct ChatServer {
    state: ChatState,
    bind: SocketAddr,
}

impl ChatServer {
    pub fn new(bind: SocketAddr, facade: Arc<CompletionFacade>) -> Self {
        let show_usage = std::env::var("DISPLAY_TOKEN_USED_FOR_QUERY")
            .map(|v| v == "true")
            .unwrap_or(false);
        let state = ChatState {
            facade,
            show_usage,
            start_time: std::time::Instant::now(),
        };
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/chat", post(chat_handler))
            .route("/api/status", get(status_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Start the server (blocks until shutdown)
    pub async fn run(self) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);
        axum::serve(listener, router).await?;
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Chat request from the widget: prior turns plus the new prompt
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub backend: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn build_messages(request: &ChatRequest) -> Vec<Message> {
    let mut messages = request.messages.clone();
    if let Some(prompt) = &request.prompt {
        messages.push(Message::user(prompt.clone()));
    }
    messages
}

fn build_options(request: &ChatRequest) -> CompletionOptions {
    CompletionOptions {
        api_key: request.api_key.clone(),
        backend: request.backend,
        temperature: request.temperature.or(Some(CHAT_TEMPERATURE)),
        ..CompletionOptions::default()
    }
}

// ── HTTP Handlers ──

async fn chat_handler(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let messages = build_messages(&request);
    let options = build_options(&request);

    info!(
        %request_id,
        provider = state.facade.provider_name(),
        messages = messages.len(),
        "chat stream request"
    );

    let sent_tokens = state.show_usage.then(|| {
        let prompt_text: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        estimate_tokens(&prompt_text.join(" "))
    });

    match state.facade.chat_completion_stream(&messages, &options).await {
        Ok(tokens) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(relay::relay_frames(tokens, sent_tokens)))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            // The stream never opened; plain JSON error instead of SSE
            error!(%request_id, "chat stream failed to start: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn status_handler(State(state): State<ChatState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "provider": state.facade.provider_name(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use studi_core::{ProviderKind, Role};

    fn request_from(json: &str) -> ChatRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_chat_request_prompt_appended_as_user_turn() {
        let request = request_from(
            r#"{"messages":[{"role":"assistant","content":"Hi!"}],"prompt":"Wann hat die Mensa offen?"}"#,
        );
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "Wann hat die Mensa offen?");
    }

    #[test]
    fn test_chat_request_api_key_is_camel_case() {
        let request = request_from(r#"{"prompt":"hi","apiKey":"user-key"}"#);
        let options = build_options(&request);
        assert_eq!(options.api_key.as_deref(), Some("user-key"));
        assert!(!options.backend);
    }

    #[test]
    fn test_default_chat_temperature() {
        let request = request_from(r#"{"prompt":"hi"}"#);
        assert_eq!(build_options(&request).temperature, Some(CHAT_TEMPERATURE));

        let request = request_from(r#"{"prompt":"hi","temperature":0.9}"#);
        assert_eq!(build_options(&request).temperature, Some(0.9));
    }

    #[test]
    fn test_router_builds() {
        let facade = Arc::new(CompletionFacade::new(ProviderKind::Google));
        let server = ChatServer::new(([127, 0, 0, 1], 0).into(), facade);
        let _ = server.router();
    }
}
