#![allow(clippy::unwrap_used, clippy::expect_used)]

use dptb_agent::{
    AgentEvent, AgentFactory, AgentMode, AgentRunner, EventStream, LlmAgent, LlmClient,
    ModelConfig,
};
use dptb_core::ToolCall;
use dptb_gateway::{AppState, GatewayConfig, GatewayServer};
use dptb_mcp::JobResources;
use dptb_session::{FileTranscriptStore, SharedConversation};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::net::TcpListener;

struct ScriptedRunner;

impl AgentRunner for ScriptedRunner {
    fn run(
        &self,
        _agent: Arc<LlmAgent>,
        _conversation: SharedConversation,
        message: String,
    ) -> EventStream {
        futures_util::stream::iter(vec![
            AgentEvent::Thinking {
                text: "Planning the calculation".into(),
            },
            AgentEvent::ToolCall {
                calls: vec![ToolCall {
                    id: "c1".into(),
                    name: "deeptb_band".into(),
                    arguments: serde_json::json!({}),
                }],
            },
            AgentEvent::Final {
                text: format!("Answer to: {message}"),
            },
        ])
        .boxed()
    }
}

/// Helper: build a test server on a random port, returning its base URL.
async fn start_test_server() -> (String, Arc<AppState>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let llm = LlmClient::new(ModelConfig {
        model_id: "deepseek-chat".to_string(),
        api_key: "test-key".to_string(),
        // Non-routable: the scripted runner never calls the LLM
        api_base_url: Some("http://127.0.0.1:1".to_string()),
        temperature: 0.7,
        max_tokens: 100,
        max_turns: 3,
    });
    let state = AppState::new(
        GatewayConfig {
            tool_endpoint: "http://127.0.0.1:50001/sse".to_string(),
            mode: AgentMode::Bohrium,
        },
        AgentFactory::new(llm, JobResources::default()),
        Arc::new(FileTranscriptStore::new(tmp.path().join("chat_history"))),
        Arc::new(ScriptedRunner),
    );
    let app = GatewayServer::build(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state, tmp)
}

async fn login(base: &str) -> serde_json::Value {
    reqwest::Client::new()
        .post(format!("{base}/api/login"))
        .json(&serde_json::json!({
            "username": "alice",
            "password": "secret",
            "project_id": "123",
            "file_path": "/personal",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (base, _state, _tmp) = start_test_server().await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "dptb-agent");
}

#[tokio::test]
async fn test_index_serves_ui() {
    let (base, _state, _tmp) = start_test_server().await;
    let resp = reqwest::get(format!("{base}/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(resp.text().await.unwrap().contains("DeePTB Agent"));
}

#[tokio::test]
async fn test_login_success() {
    let (base, state, _tmp) = start_test_server().await;
    let body = login(&base).await;

    assert_eq!(body["ok"], true);
    let session_id = body["session_id"].as_str().unwrap();
    assert_eq!(session_id.len(), 64);
    assert_eq!(
        body["status"],
        format!("Login successful! Session: {}... Project: 123", &session_id[..16])
    );
    assert_eq!(body["history"], serde_json::json!([]));
    assert_eq!(body["info"]["agent"], format!("deeptb_agent_{}", &session_id[..8]));
    assert_eq!(body["info"]["mode"], "bohr");
    assert_eq!(state.sessions.registry().len(), 1);
}

#[tokio::test]
async fn test_login_missing_field_rejected() {
    let (base, state, _tmp) = start_test_server().await;
    let body: serde_json::Value = reqwest::Client::new()
        .post(format!("{base}/api/login"))
        .json(&serde_json::json!({"username": "alice", "password": "secret"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["ok"], false);
    assert_eq!(body["status"], "Please fill in all fields");
    assert!(state.sessions.registry().is_empty());
}

#[tokio::test]
async fn test_batch_chat_round_trip() {
    let (base, _state, tmp) = start_test_server().await;
    let session_id = login(&base).await["session_id"].as_str().unwrap().to_string();

    let body: serde_json::Value = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&serde_json::json!({"session_id": session_id, "message": "band gap of Si?"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(body["response"], "Answer to: band gap of Si?");
    assert_eq!(
        body["history"],
        serde_json::json!([["band gap of Si?", "Answer to: band gap of Si?"]])
    );

    let file = tmp
        .path()
        .join("chat_history")
        .join(format!("{}.json", &session_id[..16]));
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
    assert_eq!(saved, body["history"]);
}

#[tokio::test]
async fn test_chat_without_login_reports_missing_agent() {
    let (base, _state, _tmp) = start_test_server().await;
    let body: serde_json::Value = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&serde_json::json!({"session_id": "0".repeat(64), "message": "hi"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["ok"], false);
    assert_eq!(body["status"], "Agent not found, please log in again");
}

#[tokio::test]
async fn test_stream_chat_emits_fragments_then_done() {
    let (base, _state, _tmp) = start_test_server().await;
    let session_id = login(&base).await["session_id"].as_str().unwrap().to_string();

    let text = reqwest::Client::new()
        .post(format!("{base}/api/chat/stream"))
        .json(&serde_json::json!({"session_id": session_id, "message": "bands"}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let fragments = text.matches("event: fragment").count();
    assert_eq!(fragments, 3);
    let thinking = text.find("💭 Planning the calculation").unwrap();
    let tools = text.find("🛠️ Calling tools: deeptb_band").unwrap();
    let done = text.find("event: done").unwrap();
    assert!(thinking < tools && tools < done);
    assert!(text.contains("\"status\":\"Done\""));
    assert!(text.contains("Answer to: bands"));
}

#[tokio::test]
async fn test_stream_chat_blank_message_is_error_event() {
    let (base, _state, _tmp) = start_test_server().await;
    let session_id = login(&base).await["session_id"].as_str().unwrap().to_string();

    let text = reqwest::Client::new()
        .post(format!("{base}/api/chat/stream"))
        .json(&serde_json::json!({"session_id": session_id, "message": "  "}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(text.contains("event: error"));
    assert!(text.contains("Message cannot be empty"));
    assert!(!text.contains("event: done"));
}

#[tokio::test]
async fn test_clear_empties_history() {
    let (base, _state, _tmp) = start_test_server().await;
    let session_id = login(&base).await["session_id"].as_str().unwrap().to_string();
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/chat"))
        .json(&serde_json::json!({"session_id": session_id, "message": "hi"}))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = client
        .post(format!("{base}/api/clear"))
        .json(&serde_json::json!({"session_id": session_id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "Conversation cleared");
    assert_eq!(body["history"], serde_json::json!([]));

    // A fresh login sees the empty transcript.
    assert_eq!(login(&base).await["history"], serde_json::json!([]));
}

#[tokio::test]
async fn test_shutdown_clears_sessions() {
    let (base, state, _tmp) = start_test_server().await;
    login(&base).await;
    assert_eq!(state.sessions.registry().len(), 1);

    state.shutdown();
    assert!(state.sessions.registry().is_empty());
}
