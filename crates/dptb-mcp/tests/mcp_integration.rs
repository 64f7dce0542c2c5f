#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the dptb-mcp crate.
//!
//! Runs an in-process MCP server on the SSE transport and drives it through
//! McpClient and CalculationToolset.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use dptb_core::{Credentials, ToolCall, Toolset};
use dptb_mcp::{CalculationToolset, JobResources, McpClient, RemoteBackends};
use futures_util::Stream;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Test server
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct ServerState {
    session: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    connections: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<serde_json::Value>>>,
    /// Accept POSTs even with no open event stream.
    accept_orphans: Arc<AtomicBool>,
}

impl ServerState {
    fn drop_session(&self) {
        self.session.lock().unwrap().take();
    }

    fn recorded_calls(&self) -> Vec<serde_json::Value> {
        self.calls.lock().unwrap().clone()
    }
}

async fn sse_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    *state.session.lock().unwrap() = Some(tx);
    state.connections.fetch_add(1, Ordering::SeqCst);

    Sse::new(async_stream::stream! {
        yield Ok(Event::default().event("endpoint").data("/messages/?session_id=test"));
        while let Some(msg) = rx.recv().await {
            yield Ok(Event::default().event("message").data(msg));
        }
    })
}

fn tool_list() -> serde_json::Value {
    serde_json::json!([
        {
            "name": "deeptb_band",
            "description": "Compute a band structure",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "model": {"type": "string"},
                    "executor": {"type": "object"},
                    "storage": {"type": "object"}
                },
                "required": ["model", "executor", "storage"]
            }
        },
        {
            "name": "always_fails",
            "description": "Reports an error",
            "inputSchema": {"type": "object", "properties": {}}
        }
    ])
}

async fn message_handler(
    State(state): State<ServerState>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let Some(id) = body.get("id").cloned() else {
        return StatusCode::ACCEPTED;
    };
    let method = body["method"].as_str().unwrap_or_default().to_string();

    let reply = match method.as_str() {
        "initialize" => serde_json::json!({
            "jsonrpc": "2.0", "id": id,
            "result": {
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "DeePTB", "version": "0.1.0"}
            }
        }),
        "tools/list" => serde_json::json!({
            "jsonrpc": "2.0", "id": id,
            "result": {"tools": tool_list()}
        }),
        "tools/call" => {
            let params = body["params"].clone();
            state.calls.lock().unwrap().push(params.clone());
            let name = params["name"].as_str().unwrap_or_default();
            if name == "always_fails" {
                serde_json::json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": {"content": [{"type": "text", "text": "model file missing"}], "isError": true}
                })
            } else {
                serde_json::json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": {"content": [
                        {"type": "text", "text": format!("band for {}", params["arguments"]["model"])},
                        {"type": "text", "text": "job submitted"}
                    ]}
                })
            }
        }
        _ => serde_json::json!({
            "jsonrpc": "2.0", "id": id,
            "error": {"code": -32601, "message": "Method not found"}
        }),
    };

    let sender = state.session.lock().unwrap().clone();
    match sender {
        Some(tx) => {
            let _ = tx.send(reply.to_string());
            StatusCode::ACCEPTED
        }
        None if state.accept_orphans.load(Ordering::SeqCst) => StatusCode::ACCEPTED,
        None => StatusCode::NOT_FOUND,
    }
}

async fn spawn_server() -> (String, ServerState) {
    let state = ServerState::default();
    let app = Router::new()
        .route("/sse", get(sse_handler))
        .route("/messages/", post(message_handler))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/sse"), state)
}

fn backends() -> RemoteBackends {
    let creds = Credentials::new("alice@example.com", "secret", "123", "/personal");
    RemoteBackends::from_credentials(&creds, &JobResources::default()).unwrap()
}

fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

// ---------------------------------------------------------------------------
// McpClient
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_client_handshake_discovers_tools() {
    let (url, state) = spawn_server().await;
    let (client, tools) = McpClient::connect(&url).await.unwrap();

    assert!(client.is_alive());
    assert_eq!(client.server_name(), "127.0.0.1");
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["deeptb_band", "always_fails"]);
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_call_tool_returns_text() {
    let (url, _state) = spawn_server().await;
    let (client, _) = McpClient::connect(&url).await.unwrap();

    let result = client
        .call_tool("deeptb_band", serde_json::json!({"model": "si.pth"}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text(), "band for \"si.pth\"\njob submitted");
}

#[tokio::test]
async fn test_client_unreachable_endpoint_fails() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = McpClient::connect(&format!("http://{addr}/sse")).await.err().unwrap();
    assert!(matches!(err, dptb_core::DptbError::Http(_)));
}

#[tokio::test]
async fn test_client_notices_closed_stream() {
    let (url, state) = spawn_server().await;
    let (client, _) = McpClient::connect(&url).await.unwrap();

    state.drop_session();
    for _ in 0..50 {
        if !client.is_alive() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(!client.is_alive());
}

#[tokio::test]
async fn test_request_after_stream_end_fails_fast() {
    let (url, state) = spawn_server().await;
    let (client, _) = McpClient::connect(&url).await.unwrap();

    state.accept_orphans.store(true, Ordering::SeqCst);
    state.drop_session();
    for _ in 0..50 {
        if !client.is_alive() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(!client.is_alive());

    // The POST is accepted but nothing can ever answer it.
    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        client.call_tool("deeptb_band", serde_json::json!({"model": "si.pth"})),
    )
    .await
    .expect("call must not wait for a dead stream");
    let err = outcome.err().unwrap();
    assert!(matches!(err, dptb_core::DptbError::Tool(_)));
    assert!(err.to_string().contains("closed"));
}

#[tokio::test]
async fn test_client_rejects_non_event_stream_endpoint() {
    let app = Router::new().route("/sse", get(|| async { "plain text" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let err = McpClient::connect(&format!("http://{addr}/sse")).await.err().unwrap();
    assert!(matches!(err, dptb_core::DptbError::Http(_)));
}

// ---------------------------------------------------------------------------
// CalculationToolset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_toolset_connects_lazily() {
    let (url, state) = spawn_server().await;
    let toolset = CalculationToolset::new(&url, backends()).unwrap();
    assert_eq!(state.connections.load(Ordering::SeqCst), 0);

    let tools = toolset.list_tools().await.unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);

    // The connection is reused.
    toolset.list_tools().await.unwrap();
    assert_eq!(state.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_toolset_hides_descriptor_parameters() {
    let (url, _state) = spawn_server().await;
    let toolset = CalculationToolset::new(&url, backends()).unwrap();

    let tools = toolset.list_tools().await.unwrap();
    let band = tools.iter().find(|t| t.name == "deeptb_band").unwrap();
    let props = band.parameters_schema["properties"].as_object().unwrap();
    assert!(props.contains_key("model"));
    assert!(!props.contains_key("executor"));
    assert!(!props.contains_key("storage"));
    assert_eq!(band.parameters_schema["required"], serde_json::json!(["model"]));
}

#[tokio::test]
async fn test_toolset_injects_descriptors_into_calls() {
    let (url, state) = spawn_server().await;
    let toolset = CalculationToolset::new(&url, backends()).unwrap();

    let result = toolset
        .call_tool(&call("c1", "deeptb_band", serde_json::json!({"model": "si.pth"})))
        .await
        .unwrap();
    assert_eq!(result.call_id, "c1");
    assert!(!result.is_error);

    let calls = state.recorded_calls();
    assert_eq!(calls.len(), 1);
    let args = &calls[0]["arguments"];
    assert_eq!(args["model"], "si.pth");
    assert_eq!(args["executor"]["type"], "dispatcher");
    assert_eq!(args["executor"]["machine"]["remote_profile"]["email"], "alice@example.com");
    assert_eq!(args["storage"]["type"], "bohrium");
    assert_eq!(args["storage"]["project_id"], 123);
}

#[tokio::test]
async fn test_toolset_maps_tool_errors() {
    let (url, _state) = spawn_server().await;
    let toolset = CalculationToolset::new(&url, backends()).unwrap();

    let result = toolset
        .call_tool(&call("c2", "always_fails", serde_json::json!({})))
        .await
        .unwrap();
    assert!(result.is_error);
    assert_eq!(result.content, "model file missing");
}

#[tokio::test]
async fn test_toolset_unknown_tool_is_error_result() {
    let (url, state) = spawn_server().await;
    let toolset = CalculationToolset::new(&url, backends()).unwrap();

    let result = toolset
        .call_tool(&call("c3", "rm_rf", serde_json::json!({})))
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.content.contains("rm_rf"));
    assert!(state.recorded_calls().is_empty());
}

#[tokio::test]
async fn test_toolset_reconnects_after_stream_loss() {
    let (url, state) = spawn_server().await;
    let toolset = CalculationToolset::new(&url, backends()).unwrap();
    toolset.list_tools().await.unwrap();

    state.drop_session();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let result = toolset
        .call_tool(&call("c4", "deeptb_band", serde_json::json!({"model": "gaas.pth"})))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(state.connections.load(Ordering::SeqCst), 2);
}
