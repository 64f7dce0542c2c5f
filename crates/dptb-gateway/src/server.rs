use crate::chat::{ChatOrchestrator, StreamUpdate};
use crate::router::SessionRouter;
use crate::ui;
use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use dptb_agent::{AgentFactory, AgentMode, AgentRunner, LlmAgent};
use dptb_core::{Credentials, DptbError, DptbResult, Fingerprint};
use dptb_session::{AgentRegistry, ConversationService, TranscriptStore};
use futures_util::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

/// Settings every login uses.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// SSE URL of the calculation tool server.
    pub tool_endpoint: String,
    pub mode: AgentMode,
}

/// Shared application state.
pub struct AppState {
    pub sessions: SessionRouter,
    pub chat: ChatOrchestrator,
    pub config: GatewayConfig,
    registry: Arc<AgentRegistry<LlmAgent>>,
    conversations: Arc<ConversationService>,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        factory: AgentFactory,
        transcripts: Arc<dyn TranscriptStore>,
        runner: Arc<dyn AgentRunner>,
    ) -> Arc<Self> {
        let registry = AgentRegistry::new();
        let conversations = ConversationService::new();
        Arc::new(Self {
            sessions: SessionRouter::new(registry.clone(), Arc::new(factory), transcripts.clone()),
            chat: ChatOrchestrator::new(
                registry.clone(),
                conversations.clone(),
                transcripts,
                runner,
            ),
            config,
            registry,
            conversations,
        })
    }

    /// Drops every cached agent and conversation.
    pub fn shutdown(&self) {
        info!(
            agents = self.registry.len(),
            conversations = self.conversations.len(),
            "Clearing sessions"
        );
        self.registry.clear();
        self.conversations.clear();
    }
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    pub fn build(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(ui::index_handler))
            .route("/health", get(health_handler))
            .route("/api/login", post(login_handler))
            .route("/api/chat", post(chat_handler))
            .route("/api/chat/stream", post(chat_stream_handler))
            .route("/api/clear", post(clear_handler))
            .with_state(state)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    pub session_id: String,
}

/// Text shown to the user for a failure.
pub fn status_text(err: &DptbError) -> String {
    match err {
        DptbError::Validation(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// An unknown or malformed session id means the user must log in.
fn session(raw: &str) -> DptbResult<Fingerprint> {
    Fingerprint::parse(raw).map_err(|_| DptbError::AgentNotFound)
}

fn failure(err: &DptbError) -> Response {
    Json(serde_json::json!({"ok": false, "status": status_text(err)})).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "dptb-agent"}))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> Response {
    let outcome = match state
        .sessions
        .get_or_create(&credentials, &state.config.tool_endpoint, state.config.mode)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "Login rejected");
            return failure(&e);
        }
    };

    Json(serde_json::json!({
        "ok": true,
        "session_id": outcome.fingerprint.as_str(),
        "status": outcome.status,
        "history": outcome.transcript,
        "info": {
            "agent": outcome.agent.name,
            "description": outcome.agent.description,
            "username": credentials.username,
            "project_id": credentials.project_id,
            "file_path": credentials.file_path,
            "mode": state.config.mode.to_string(),
        },
    }))
    .into_response()
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Response {
    let result = match session(&body.session_id) {
        Ok(fp) => state.chat.chat(&fp, &body.message).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(reply) => Json(serde_json::json!({
            "ok": true,
            "response": reply.response,
            "history": reply.history,
            "status": crate::chat::STATUS_DONE,
        }))
        .into_response(),
        Err(e) => failure(&e),
    }
}

fn sse_error(err: &DptbError) -> Response {
    let data = serde_json::json!({"status": status_text(err)}).to_string();
    let stream = futures_util::stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("error").data(data))
    });
    Sse::new(stream).into_response()
}

async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Response {
    let updates = match session(&body.session_id)
        .and_then(|fp| state.chat.chat_stream(&fp, &body.message))
    {
        Ok(updates) => updates,
        Err(e) => return sse_error(&e),
    };

    let stream = updates.map(|update| {
        let event = match update {
            StreamUpdate::Fragment { fragment, response } => Event::default()
                .event("fragment")
                .data(
                    serde_json::json!({
                        "kind": fragment.kind,
                        "text": fragment.text,
                        "response": response,
                    })
                    .to_string(),
                ),
            StreamUpdate::Done { history, status } => Event::default().event("done").data(
                serde_json::json!({"history": history, "status": status}).to_string(),
            ),
        };
        Ok::<_, Infallible>(event)
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn clear_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClearRequest>,
) -> Response {
    let result = match session(&body.session_id) {
        Ok(fp) => state.chat.clear(&fp).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(status) => Json(serde_json::json!({
            "ok": true,
            "history": [],
            "status": status,
        }))
        .into_response(),
        Err(e) => failure(&e),
    }
}
