//! Calculation tools served over MCP, with the user's remote execution and
//! storage descriptors attached to every call.

use crate::client::McpClient;
use crate::descriptor::RemoteBackends;
use crate::protocol::McpToolDef;
use async_trait::async_trait;
use dptb_core::{DptbError, DptbResult, ToolCall, ToolDescriptor, ToolResult, Toolset};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Argument names reserved for the descriptors. They are hidden from the LLM
/// and filled in on every call.
pub const EXECUTOR_ARG: &str = "executor";
pub const STORAGE_ARG: &str = "storage";

struct Connection {
    client: Arc<McpClient>,
    tools: Vec<McpToolDef>,
}

/// Remote calculation tools for one user.
///
/// Construction only records the endpoint and descriptors; the endpoint is
/// contacted on first use and again whenever the event stream has dropped.
pub struct CalculationToolset {
    endpoint: String,
    backends: RemoteBackends,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl CalculationToolset {
    /// Fails with a configuration error when `endpoint` is not a URL.
    pub fn new(endpoint: &str, backends: RemoteBackends) -> DptbResult<Self> {
        reqwest::Url::parse(endpoint)
            .map_err(|e| DptbError::Config(format!("invalid tool endpoint '{endpoint}': {e}")))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            backends,
            connection: Mutex::new(None),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn backends(&self) -> &RemoteBackends {
        &self.backends
    }

    async fn connection(&self) -> DptbResult<Arc<Connection>> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            if conn.client.is_alive() {
                return Ok(conn.clone());
            }
            warn!(endpoint = %self.endpoint, "MCP connection lost, reconnecting");
        }
        let (client, tools) = McpClient::connect(&self.endpoint).await?;
        let conn = Arc::new(Connection {
            client: Arc::new(client),
            tools,
        });
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Call arguments with both descriptors injected. Non-object arguments
    /// are replaced by an object holding only the descriptors.
    pub fn inject_descriptors(&self, arguments: &serde_json::Value) -> DptbResult<serde_json::Value> {
        let mut args = match arguments {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        args.insert(EXECUTOR_ARG.to_string(), serde_json::to_value(&self.backends.executor)?);
        args.insert(STORAGE_ARG.to_string(), serde_json::to_value(&self.backends.storage)?);
        Ok(serde_json::Value::Object(args))
    }
}

/// What the LLM sees of a remote tool.
pub fn describe(tool: &McpToolDef) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters_schema: tool.schema_without(&[EXECUTOR_ARG, STORAGE_ARG]),
    }
}

#[async_trait]
impl Toolset for CalculationToolset {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn list_tools(&self) -> DptbResult<Vec<ToolDescriptor>> {
        let conn = self.connection().await?;
        Ok(conn.tools.iter().map(describe).collect())
    }

    async fn call_tool(&self, call: &ToolCall) -> DptbResult<ToolResult> {
        let conn = self.connection().await?;
        if !conn.tools.iter().any(|t| t.name == call.name) {
            return Ok(ToolResult::error(
                &call.id,
                format!("Unknown tool '{}'", call.name),
            ));
        }

        let arguments = self.inject_descriptors(&call.arguments)?;
        info!(tool = %call.name, call_id = %call.id, "Calling remote tool");
        let result = conn.client.call_tool(&call.name, arguments).await?;

        let text = result.text();
        if result.is_error {
            Ok(ToolResult::error(&call.id, text))
        } else {
            Ok(ToolResult::success(&call.id, text))
        }
    }
}
