use crate::backends::openai::OpenAiBackend;
use crate::backends::LlmBackend;
use crate::config::ModelConfig;
use dptb_core::{DptbResult, Message, ToolCall, ToolDescriptor};
use std::sync::Arc;

/// Response from the LLM — either text content or a tool call request.
#[derive(Debug)]
pub enum LlmResponse {
    Text(String),
    ToolUse {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Done(String),
}

/// LLM client shared by every agent. Cloning is cheap.
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
    max_turns: u32,
}

impl LlmClient {
    pub fn new(config: ModelConfig) -> Self {
        let max_turns = config.max_turns;
        Self {
            backend: Arc::new(OpenAiBackend::new(config)),
            max_turns,
        }
    }

    /// Create from a pre-built backend (for custom providers and tests).
    pub fn from_backend(backend: Arc<dyn LlmBackend>, max_turns: u32) -> Self {
        Self { backend, max_turns }
    }

    /// Upper bound on LLM calls per user message.
    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Non-streaming chat completion.
    pub async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> DptbResult<LlmResponse> {
        self.backend.chat(system_prompt, messages, tools).await
    }
}
