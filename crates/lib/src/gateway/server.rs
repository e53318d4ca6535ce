//! Gateway HTTP server: webhook handshake and events, health, and debug listings.

use crate::agent::GeneralProcessor;
use crate::config::{self, Config, OutputMode};
use crate::data_query::DataProcessor;
use crate::delivery::Delivery;
use crate::dispatch::Dispatcher;
use crate::event::InboundEvent;
use crate::gateway::signature::{verify_signature, SIGNATURE_HEADER};
use crate::llm::{CompletionBackend, OpenAiClient};
use crate::session::{ConversationStore, Peek};
use crate::sql::{PostgresTranslator, SqlTranslator};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub store: Arc<ConversationStore>,
    pub dispatcher: Arc<Dispatcher>,
    /// Effective output mode of the delivery gateway.
    pub output: OutputMode,
    /// RFC 3339 start time, reported by the health endpoint.
    pub started_at: String,
}

impl GatewayState {
    /// Wire the store, completion client, translator, delivery and processors from config.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = Arc::new(ConversationStore::new(config.conversation.max_stored_turns));
        let llm: Arc<dyn CompletionBackend> = Arc::new(OpenAiClient::new(
            config::non_empty(&config.completion.base_url),
            config::non_empty(&config.completion.api_key),
            config::non_empty(&config.completion.model),
            Duration::from_secs(config.completion.timeout_secs),
        ));
        if config::non_empty(&config.completion.api_key).is_none() {
            log::warn!("OPENAI_API_KEY not configured; general queries will fail");
        }
        let delivery = Arc::new(Delivery::from_config(&config));
        let translator: Option<Arc<dyn SqlTranslator>> =
            match config::non_empty(&config.database.url) {
                Some(url) => Some(Arc::new(
                    PostgresTranslator::connect_lazy(&url, &config.database, llm.clone())
                        .context("configuring database pool")?,
                )),
                None => {
                    log::info!("no DATABASE_URL configured; data queries are disabled");
                    None
                }
            };
        let general = Arc::new(GeneralProcessor::new(
            store.clone(),
            llm,
            delivery.clone(),
            config.conversation.prompt_window,
        ));
        let output = delivery.mode();
        let data = Arc::new(DataProcessor::new(translator, delivery));
        Ok(Self {
            config: Arc::new(config),
            store,
            dispatcher: Arc::new(Dispatcher::new(general, data)),
            output,
            started_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Routes: `/`, `/webhook` (GET handshake, POST events), `/messages/:phone`, `/menu/:phone`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/webhook", get(webhook_verify).post(webhook_event))
        .route("/messages/:phone", get(messages_http))
        .route("/menu/:phone", get(menu_http))
        .with_state(state)
}

/// Run the gateway on config.server.bind:config.server.port until Ctrl+C or SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    let state = GatewayState::from_config(config)?;
    log::info!("output mode: {}", state.output.as_str());
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.server.port,
        "output": state.output.as_str(),
        "startedAt": state.started_at,
    }))
}

/// GET /webhook: subscription handshake. Echoes `hub.challenge` when the verify token matches.
async fn webhook_verify(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let expected = config::non_empty(&state.config.webhook.verify_token);
    let provided = params.get("hub.verify_token").map(String::as_str);
    if expected.is_none() || provided != expected.as_deref() {
        log::warn!("webhook verification refused: token mismatch");
        return (StatusCode::FORBIDDEN, "Invalid token").into_response();
    }
    if params.get("hub.mode").map(String::as_str) != Some("subscribe") {
        return (StatusCode::BAD_REQUEST, "Unknown hub.mode").into_response();
    }
    match params.get("hub.challenge") {
        Some(challenge) => (StatusCode::OK, challenge.clone()).into_response(),
        None => (StatusCode::BAD_REQUEST, "Missing hub.challenge").into_response(),
    }
}

/// POST /webhook: validate the event and start processing. 200 when a message was
/// dispatched, 400 otherwise. Processing continues after the response.
async fn webhook_event(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = config::non_empty(&state.config.webhook.app_secret) {
        let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !verify_signature(&secret, header, &body) {
            log::warn!("webhook event rejected: invalid signature");
            return (StatusCode::UNAUTHORIZED, "Invalid signature").into_response();
        }
    }
    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("failed to process webhook body: not json: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid event").into_response();
        }
    };
    let event = match InboundEvent::parse(&raw) {
        Ok(ev) => ev,
        Err(e) => {
            log::warn!("failed to process webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid event").into_response();
        }
    };
    match state.dispatcher.dispatch(event) {
        Some(_) => StatusCode::OK.into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// GET /messages/:phone: sender's stored history (debugging).
async fn messages_http(State(state): State<GatewayState>, Path(phone): Path<String>) -> Response {
    listing(state.store.peek(&phone, |c| c.history().to_vec()).await)
}

/// GET /menu/:phone: sender's catalog (debugging).
async fn menu_http(State(state): State<GatewayState>, Path(phone): Path<String>) -> Response {
    listing(state.store.peek(&phone, |c| c.catalog().to_vec()).await)
}

/// 503 while a turn for the sender is running; listings never wait on completion calls.
fn listing<T: serde::Serialize>(peek: Peek<T>) -> Response {
    match peek {
        Peek::Ready(body) => Json(body).into_response(),
        Peek::Busy => (StatusCode::SERVICE_UNAVAILABLE, "Conversation is busy").into_response(),
        Peek::Unknown => (StatusCode::BAD_REQUEST, "Phone is invalid").into_response(),
    }
}
