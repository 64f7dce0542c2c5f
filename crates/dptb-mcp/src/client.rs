//! MCP client over the SSE transport: a long-lived `GET` event stream for
//! server-to-client messages and `POST`s for client-to-server messages.

use crate::protocol::*;
use dptb_core::{DptbError, DptbResult};
use futures_util::StreamExt;
use reqwest::Url;
use reqwest_eventsource::{Event, EventSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Timeout for each handshake request and for the `endpoint` event.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// MCP client connected to one tool endpoint.
pub struct McpClient {
    http: reqwest::Client,
    post_url: Url,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    server_name: String,
}

impl McpClient {
    /// Opens the event stream at `sse_url`, waits for the message endpoint,
    /// performs the initialize handshake and lists the server's tools.
    pub async fn connect(sse_url: &str) -> DptbResult<(Self, Vec<McpToolDef>)> {
        let url = Url::parse(sse_url)
            .map_err(|e| DptbError::Config(format!("invalid tool endpoint '{sse_url}': {e}")))?;
        let http = reqwest::Client::new();

        let events = EventSource::new(
            http.get(url.clone())
                .header(reqwest::header::ACCEPT, "text/event-stream"),
        )
        .map_err(|e| DptbError::Http(format!("cannot open tool endpoint {url}: {e}")))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<DptbResult<String>>();

        let reader = tokio::spawn(read_events(
            events,
            url.clone(),
            endpoint_tx,
            pending.clone(),
            alive.clone(),
        ));

        let endpoint = match tokio::time::timeout(HANDSHAKE_TIMEOUT, endpoint_rx).await {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(e))) => {
                reader.abort();
                return Err(e);
            }
            Ok(Err(_)) => {
                reader.abort();
                return Err(DptbError::Tool("event stream closed before the endpoint event".into()));
            }
            Err(_) => {
                reader.abort();
                return Err(DptbError::Tool("timed out waiting for the endpoint event".into()));
            }
        };
        let post_url = url
            .join(&endpoint)
            .map_err(|e| DptbError::Tool(format!("invalid message endpoint '{endpoint}': {e}")))?;
        debug!(%post_url, "MCP message endpoint received");

        let client = Self {
            http,
            post_url,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            reader,
            server_name: url.host_str().unwrap_or("mcp").to_string(),
        };

        let init = client.initialize().await?;
        let server = init.server_info.map(|s| s.name).unwrap_or_default();
        info!(
            endpoint = %url,
            server = %server,
            version = %init.protocol_version,
            "MCP server initialized"
        );
        client.notify("notifications/initialized").await?;

        let tools = client.list_tools().await?;
        info!(endpoint = %url, tools = tools.len(), "MCP tools discovered");

        Ok((client, tools))
    }

    /// Sends a request and waits for the matching response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> DptbResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        // The reader clears `pending` once when the stream ends; a sender
        // inserted after that would never be answered.
        if !self.is_alive() {
            self.pending.lock().await.remove(&id);
            return Err(DptbError::Tool(format!("MCP connection closed before '{method}'")));
        }

        if let Err(e) = self.post(&JsonRpcRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let resp = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(resp) => resp,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    return Err(DptbError::Tool(format!("MCP request '{method}' timed out")));
                }
            },
            None => rx.await,
        }
        .map_err(|_| DptbError::Tool(format!("MCP connection closed during '{method}'")))?;

        if let Some(err) = resp.error {
            return Err(DptbError::Tool(format!("MCP error {}: {}", err.code, err.message)));
        }
        resp.result
            .ok_or_else(|| DptbError::Tool(format!("empty '{method}' result")))
    }

    async fn notify(&self, method: &str) -> DptbResult<()> {
        self.post(&JsonRpcNotification::new(method)).await
    }

    async fn post<T: serde::Serialize>(&self, body: &T) -> DptbResult<()> {
        let resp = self
            .http
            .post(self.post_url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| DptbError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(DptbError::Http(format!("MCP POST failed {status}: {text}")));
        }
        Ok(())
    }

    async fn initialize(&self) -> DptbResult<InitializeResult> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "dptb-agent",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self
            .request("initialize", Some(params), Some(HANDSHAKE_TIMEOUT))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Lists the server's tools.
    pub async fn list_tools(&self) -> DptbResult<Vec<McpToolDef>> {
        let result = self
            .request("tools/list", None, Some(HANDSHAKE_TIMEOUT))
            .await?;
        let tools = result.get("tools").cloned().unwrap_or(serde_json::json!([]));
        Ok(serde_json::from_value(tools)?)
    }

    /// Calls a tool. Waits as long as the server takes.
    pub async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> DptbResult<McpToolResult> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.request("tools/call", Some(params), None).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// False once the event stream has ended.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads the event stream until it ends, routing responses to waiters.
///
/// The first failure closes the source: a reconnect would open a new server
/// session with a different message endpoint.
async fn read_events(
    mut events: EventSource,
    url: Url,
    endpoint_tx: oneshot::Sender<DptbResult<String>>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
) {
    let mut endpoint_tx = Some(endpoint_tx);

    while let Some(event) = events.next().await {
        let message = match event {
            Ok(Event::Open) => {
                debug!(endpoint = %url, "MCP event stream open");
                continue;
            }
            Ok(Event::Message(message)) => message,
            Err(e) => {
                match endpoint_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(DptbError::Http(format!(
                            "cannot reach tool endpoint {url}: {e}"
                        ))));
                    }
                    None => warn!(endpoint = %url, error = %e, "MCP event stream ended"),
                }
                events.close();
                break;
            }
        };
        match message.event.as_str() {
            "endpoint" => {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(Ok(message.data.trim().to_string()));
                }
            }
            "message" => match serde_json::from_str::<JsonRpcResponse>(&message.data) {
                Ok(resp) => {
                    if let Some(id) = resp.id {
                        if let Some(tx) = pending.lock().await.remove(&id) {
                            let _ = tx.send(resp);
                        }
                    }
                }
                Err(e) => debug!(data = %message.data, error = %e, "Non-JSON-RPC MCP message"),
            },
            other => debug!(event = other, "Ignoring MCP event"),
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a "connection closed" error.
    pending.lock().await.clear();
    debug!("MCP event stream closed");
}
