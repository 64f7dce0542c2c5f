pub mod openai;

use crate::llm::LlmResponse;
use async_trait::async_trait;
use dptb_core::{DptbResult, Message, ToolDescriptor};

/// Trait for LLM provider backends.
///
/// The agent loop only needs one non-streaming completion per turn, so the
/// seam is a single method. Tests plug scripted backends in here.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Non-streaming chat completion.
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> DptbResult<LlmResponse>;
}
