//! Events an agent turn produces, in the order it produces them.

use dptb_core::ToolCall;
use serde::Serialize;

/// Error code reported when the loop runs out of turns.
pub const MAX_TURNS_EXCEEDED: &str = "max_turns_exceeded";

/// Response text for an escalation that carries neither a message nor a code.
pub const UNKNOWN_ESCALATION: &str = "The agent stopped due to an unknown error.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Intermediate assistant text.
    Text { text: String },
    /// Reasoning that accompanies a tool request.
    Thinking { text: String },
    /// The LLM asked for one or more tools.
    ToolCall { calls: Vec<ToolCall> },
    ToolResult {
        tool_name: String,
        content: String,
        is_error: bool,
    },
    /// The answer to the user's message.
    Final { text: String },
    /// The turn stopped without an answer.
    Escalation {
        error_code: Option<String>,
        error_message: Option<String>,
    },
}

impl AgentEvent {
    pub fn escalation(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self::Escalation {
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
        }
    }

    /// True for the events that end a turn.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Escalation { .. })
    }

    /// The text shown to the user for a final event; `None` otherwise.
    pub fn response_text(&self) -> Option<String> {
        match self {
            Self::Final { text } => Some(text.clone()),
            Self::Escalation {
                error_code,
                error_message,
            } => Some(escalation_text(error_code.as_deref(), error_message.as_deref())),
            _ => None,
        }
    }
}

/// Message if present, else `Agent error: <code>`, else a generic notice.
pub fn escalation_text(error_code: Option<&str>, error_message: Option<&str>) -> String {
    let present = |s: Option<&str>| s.filter(|s| !s.trim().is_empty()).map(str::to_string);
    present(error_message)
        .or_else(|| present(error_code).map(|code| format!("Agent error: {code}")))
        .unwrap_or_else(|| UNKNOWN_ESCALATION.to_string())
}
