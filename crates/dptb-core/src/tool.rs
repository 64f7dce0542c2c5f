use crate::{DptbResult, ToolCall, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata describing a tool as presented to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, as the LLM must spell it in a call.
    pub name: String,
    /// Human-readable description shown to the LLM.
    pub description: String,
    /// JSON Schema of the tool's arguments.
    pub parameters_schema: serde_json::Value,
}

/// A collection of callable tools backing an agent.
///
/// Implementations may connect lazily: nothing is contacted until the first
/// call to [`Toolset::list_tools`] or [`Toolset::call_tool`].
#[async_trait]
pub trait Toolset: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Descriptors of every tool the agent may call.
    async fn list_tools(&self) -> DptbResult<Vec<ToolDescriptor>>;

    /// Executes a single tool call.
    async fn call_tool(&self, call: &ToolCall) -> DptbResult<ToolResult>;
}
