use super::LlmBackend;
use crate::config::ModelConfig;
use crate::llm::LlmResponse;
use async_trait::async_trait;
use dptb_core::{DptbError, DptbResult, Message, Role, ToolCall, ToolDescriptor};
use tracing::debug;

/// OpenAI-compatible chat completions backend.
///
/// DeepSeek is the default provider; any endpoint speaking the same API with
/// function calling works.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn build_messages(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
    ) -> Vec<serde_json::Value> {
        let mut api_messages: Vec<serde_json::Value> = Vec::new();

        if let Some(sys) = system_prompt {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }

        for m in messages {
            let message = match m.role {
                // The instruction is passed as `system_prompt`.
                Role::System => continue,
                Role::User => serde_json::json!({
                    "role": "user",
                    "content": m.content
                }),
                Role::Assistant if !m.tool_calls.is_empty() => {
                    let calls: Vec<serde_json::Value> = m
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            serde_json::json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    let content = if m.content.is_empty() {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::String(m.content.clone())
                    };
                    serde_json::json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": calls
                    })
                }
                Role::Assistant => serde_json::json!({
                    "role": "assistant",
                    "content": m.content
                }),
                Role::Tool => serde_json::json!({
                    "role": "tool",
                    "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.content
                }),
            };
            api_messages.push(message);
        }

        api_messages
    }

    fn build_tools(&self, tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> DptbResult<LlmResponse> {
        let url = format!("{}/chat/completions", self.config.base_url());
        let api_messages = self.build_messages(system_prompt, messages);

        let mut body = serde_json::json!({
            "model": self.config.wire_model(),
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": api_messages,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(self.build_tools(tools));
        }

        debug!(model = %self.config.wire_model(), messages = messages.len(), tools = tools.len(), "LLM request");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DptbError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DptbError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(DptbError::Http(format!(
                "LLM API error {}: {}",
                status, resp_body
            )));
        }

        parse_openai_response(&resp_body)
    }
}

pub fn parse_openai_response(body: &serde_json::Value) -> DptbResult<LlmResponse> {
    let choice = &body["choices"][0];
    if choice.is_null() {
        return Err(DptbError::Agent(format!("LLM response has no choices: {body}")));
    }
    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();

    let tool_calls: Vec<ToolCall> = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let id = tc["id"].as_str()?.to_string();
                    let name = tc["function"]["name"].as_str()?.to_string();
                    let arguments: serde_json::Value = tc["function"]["arguments"]
                        .as_str()
                        .and_then(|raw| serde_json::from_str(raw).ok())
                        .unwrap_or_else(|| serde_json::json!({}));
                    Some(ToolCall {
                        id,
                        name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if !tool_calls.is_empty() {
        return Ok(LlmResponse::ToolUse {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
        });
    }

    let finish_reason = choice["finish_reason"].as_str().unwrap_or("stop");
    if finish_reason == "stop" {
        Ok(LlmResponse::Done(content))
    } else {
        Ok(LlmResponse::Text(content))
    }
}
