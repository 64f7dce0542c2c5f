//! Core types and error definitions for the DeePTB agent front-end.
//!
//! This crate provides the foundational types shared across all `dptb-*`
//! crates: the error taxonomy, conversation messages, tool call abstractions
//! and the credential fingerprint that keys every user session.
//!
//! # Main types
//!
//! - [`DptbError`] — Unified error enum for all subsystems.
//! - [`DptbResult`] — Convenience alias for `Result<T, DptbError>`.
//! - [`Role`] / [`Message`] — LLM-side conversation messages.
//! - [`ToolCall`] / [`ToolResult`] — LLM-initiated tool invocations.
//! - [`Credentials`] / [`Fingerprint`] — login data and its stable hash.
//! - [`Toolset`] — the seam between the agent loop and remote tools.

/// Credentials and the session fingerprint derived from them.
pub mod identity;
/// Tool descriptors and the [`Toolset`] trait.
pub mod tool;

pub use identity::{Credentials, Fingerprint};
pub use tool::{ToolDescriptor, Toolset};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the DeePTB agent front-end.
///
/// Each variant corresponds to one class of failure in the error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum DptbError {
    /// Missing or empty user input (credential fields, blank messages).
    #[error("Validation error: {0}")]
    Validation(String),

    /// No cached agent exists for the requested fingerprint.
    #[error("Agent not found, please log in again")]
    AgentNotFound,

    /// The agent factory could not build an agent for these credentials.
    #[error("Failed to create agent: {0}")]
    AgentConstruction(String),

    /// An error in configuration parsing or validation (e.g. unknown mode).
    #[error("Config error: {0}")]
    Config(String),

    /// An error originating from the agent execution loop.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error related to session or transcript persistence.
    #[error("Session error: {0}")]
    Session(String),

    /// An error raised by the remote tool endpoint.
    #[error("Tool error: {0}")]
    Tool(String),

    /// An error from an outbound HTTP request (LLM API, tool endpoint).
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`DptbError`].
pub type DptbResult<T> = Result<T, DptbError>;

// --- Message types ---

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
    /// A system-level instruction or prompt.
    System,
    /// Output produced by a tool invocation.
    Tool,
}

/// A single message exchanged within a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For [`Role::Tool`] messages, the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a new message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a new message with [`Role::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates an assistant message that requests the given tool calls.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, content.unwrap_or_default());
        msg.tool_calls = tool_calls;
        msg
    }

    /// Creates a [`Role::Tool`] message carrying a tool result.
    pub fn tool(result: &ToolResult) -> Self {
        let mut msg = Self::new(Role::Tool, result.content.clone());
        msg.tool_call_id = Some(result.call_id.clone());
        msg
    }
}

// --- Tool types ---

/// A request from the LLM to invoke a specific tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier assigned by the LLM for this tool call.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

/// The result returned after executing a [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The ID of the [`ToolCall`] this result corresponds to.
    pub call_id: String,
    /// The textual output produced by the tool.
    pub content: String,
    /// Whether the tool execution ended in an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful tool result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates an error tool result.
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}
