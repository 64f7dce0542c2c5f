use crate::event::{AgentEvent, MAX_TURNS_EXCEEDED};
use crate::factory::LlmAgent;
use crate::llm::LlmResponse;
use dptb_core::{Message, ToolResult};
use dptb_session::SharedConversation;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Events of one turn, ending after the first final event.
pub type EventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// Runs one user message through an agent.
pub trait AgentRunner: Send + Sync {
    fn run(
        &self,
        agent: Arc<LlmAgent>,
        conversation: SharedConversation,
        message: String,
    ) -> EventStream;
}

/// The agentic loop.
/// Prompt → LLM → ToolCall → Execute tool → Backfill → Repeat.
#[derive(Debug, Default, Clone)]
pub struct LlmRunner;

impl LlmRunner {
    pub fn new() -> Self {
        Self
    }
}

impl AgentRunner for LlmRunner {
    fn run(
        &self,
        agent: Arc<LlmAgent>,
        conversation: SharedConversation,
        message: String,
    ) -> EventStream {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(run_loop(agent, conversation, message, tx));
        Box::pin(ReceiverStream::new(rx))
    }
}

/// Event sink for one turn. Sends stop once the consumer is gone; the turn
/// itself still runs to its end, so every `tool_calls` message is answered.
struct Events {
    tx: mpsc::Sender<AgentEvent>,
    detached: bool,
}

impl Events {
    async fn emit(&mut self, event: AgentEvent) {
        if self.detached {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!("Event consumer gone, finishing turn detached");
            self.detached = true;
        }
    }
}

async fn run_loop(
    agent: Arc<LlmAgent>,
    conversation: SharedConversation,
    user_input: String,
    tx: mpsc::Sender<AgentEvent>,
) {
    let mut events = Events {
        tx,
        detached: false,
    };
    // Held for the whole turn.
    let mut conversation = conversation.lock().await;
    conversation.add_message(Message::user(&user_input));

    let tools = match agent.tools.list_tools().await {
        Ok(tools) => tools,
        Err(e) => {
            error!(agent = %agent.name, error = %e, "Listing tools failed");
            events.emit(AgentEvent::escalation("tools_unavailable", e.to_string())).await;
            return;
        }
    };

    let max_turns = agent.llm.max_turns();
    info!(agent = %agent.name, tools = tools.len(), "Starting agentic loop");

    for turn in 0..max_turns {
        info!(turn = turn, "Agentic loop turn");

        let response = match agent
            .llm
            .chat(Some(agent.instruction.as_str()), &conversation.messages, &tools)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(agent = %agent.name, error = %e, "LLM call failed");
                events.emit(AgentEvent::escalation("llm_error", e.to_string())).await;
                return;
            }
        };

        match response {
            LlmResponse::Done(text) => {
                conversation.add_message(Message::assistant(&text));
                info!(agent = %agent.name, turns = turn + 1, "Agentic loop completed");
                events.emit(AgentEvent::Final { text }).await;
                return;
            }

            LlmResponse::Text(text) => {
                conversation.add_message(Message::assistant(&text));
                events.emit(AgentEvent::Text { text }).await;
            }

            LlmResponse::ToolUse {
                content,
                tool_calls,
            } => {
                conversation.add_message(Message::assistant_tool_calls(
                    content.clone(),
                    tool_calls.clone(),
                ));
                if let Some(text) = content {
                    events.emit(AgentEvent::Thinking { text }).await;
                }
                events
                    .emit(AgentEvent::ToolCall {
                        calls: tool_calls.clone(),
                    })
                    .await;

                for call in tool_calls {
                    info!(tool = %call.name, call_id = %call.id, "Executing tool call");

                    let result = match agent.tools.call_tool(&call).await {
                        Ok(result) => result,
                        Err(e) => {
                            error!(error = %e, tool = %call.name, "Tool execution failed");
                            ToolResult::error(&call.id, format!("Tool error: {e}"))
                        }
                    };

                    conversation.add_message(Message::tool(&result));
                    let event = AgentEvent::ToolResult {
                        tool_name: call.name.clone(),
                        content: result.content,
                        is_error: result.is_error,
                    };
                    events.emit(event).await;
                }
            }
        }
    }

    warn!(agent = %agent.name, max_turns, "Agentic loop reached max turns");
    events
        .emit(AgentEvent::escalation(
            MAX_TURNS_EXCEEDED,
            format!("Agentic loop exceeded maximum of {max_turns} turns"),
        ))
        .await;
}
