//! Turns a user message into a response, batch or incremental, and keeps the
//! transcript on disk in step.

use dptb_agent::event::AgentEvent;
use dptb_agent::{AgentRunner, LlmAgent};
use dptb_core::{DptbError, DptbResult, Fingerprint};
use dptb_session::{
    AgentRegistry, ConversationService, SharedConversation, Transcript, TranscriptStore, Turn,
};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

/// App name conversations are filed under.
pub const APP_NAME: &str = "deeptb_agent";

/// Batch response when the agent never produced a final event.
pub const NO_FINAL_RESPONSE: &str = "The agent finished without producing a final response.";

pub const STATUS_DONE: &str = "Done";
pub const STATUS_CLEARED: &str = "Conversation cleared";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    Final,
    ToolCall,
    Thinking,
    Info,
}

/// A displayable piece of an agent turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub text: String,
}

impl Fragment {
    fn new(kind: FragmentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// The fragment as appended to the running response.
    pub fn render(&self) -> String {
        match self.kind {
            FragmentKind::Final => format!("\n\n✅ {}", self.text),
            FragmentKind::ToolCall => format!("\n\n🛠️ {}", self.text),
            FragmentKind::Thinking => format!("\n💭 {}", self.text),
            FragmentKind::Info => format!("\n{}", self.text),
        }
    }
}

/// Maps an agent event to the fragment shown for it, if any.
pub fn classify(event: &AgentEvent) -> Option<Fragment> {
    let fragment = match event {
        AgentEvent::Final { text } => Fragment::new(FragmentKind::Final, text.clone()),
        AgentEvent::Escalation { .. } => {
            let text = event.response_text().unwrap_or_default();
            Fragment::new(FragmentKind::Final, format!("⚠️ {text}"))
        }
        AgentEvent::ToolCall { calls } => {
            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            Fragment::new(
                FragmentKind::ToolCall,
                format!("Calling tools: {}", names.join(", ")),
            )
        }
        AgentEvent::Thinking { text } => {
            let text = if text.trim().is_empty() {
                "Thinking..."
            } else {
                text.as_str()
            };
            Fragment::new(FragmentKind::Thinking, text)
        }
        AgentEvent::Text { text } => Fragment::new(FragmentKind::Info, text.clone()),
        AgentEvent::ToolResult { content, .. } => Fragment::new(FragmentKind::Info, content.clone()),
    };
    match fragment.kind {
        FragmentKind::Final | FragmentKind::Info if fragment.text.trim().is_empty() => None,
        _ => Some(fragment),
    }
}

/// Reply to a batch turn.
#[derive(Debug, Clone)]
pub struct BatchReply {
    pub response: String,
    pub history: Transcript,
}

/// One update of an incremental turn.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    Fragment {
        fragment: Fragment,
        /// Everything rendered so far, trimmed.
        response: String,
    },
    Done {
        history: Transcript,
        status: String,
    },
}

/// Runs chat turns against cached agents.
#[derive(Clone)]
pub struct ChatOrchestrator {
    registry: Arc<AgentRegistry<LlmAgent>>,
    conversations: Arc<ConversationService>,
    transcripts: Arc<dyn TranscriptStore>,
    runner: Arc<dyn AgentRunner>,
}

impl ChatOrchestrator {
    pub fn new(
        registry: Arc<AgentRegistry<LlmAgent>>,
        conversations: Arc<ConversationService>,
        transcripts: Arc<dyn TranscriptStore>,
        runner: Arc<dyn AgentRunner>,
    ) -> Self {
        Self {
            registry,
            conversations,
            transcripts,
            runner,
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationService> {
        &self.conversations
    }

    fn prepare(
        &self,
        fingerprint: &Fingerprint,
        message: &str,
    ) -> DptbResult<(Arc<LlmAgent>, SharedConversation)> {
        if message.trim().is_empty() {
            return Err(DptbError::Validation("Message cannot be empty".into()));
        }
        let agent = self
            .registry
            .get(fingerprint)
            .ok_or(DptbError::AgentNotFound)?;
        let conversation = self
            .conversations
            .get_or_create(APP_NAME, &agent.user_id, fingerprint);
        Ok((agent, conversation))
    }

    async fn append_turn(&self, fingerprint: &Fingerprint, message: &str, response: &str) -> Transcript {
        let mut history = self.transcripts.load(fingerprint).await.into_transcript();
        history.push(Turn::new(message, response));
        self.transcripts.save(fingerprint, &history).await;
        history
    }

    /// Runs a turn to completion and returns the final response.
    pub async fn chat(&self, fingerprint: &Fingerprint, message: &str) -> DptbResult<BatchReply> {
        let (agent, conversation) = self.prepare(fingerprint, message)?;
        info!(session = %fingerprint.short(), agent = %agent.name, "Chat turn");

        let mut events = self.runner.run(agent, conversation, message.to_string());
        let mut response = None;
        while let Some(event) = events.next().await {
            if response.is_none() && event.is_final() {
                response = event.response_text();
            }
        }
        let response = response.unwrap_or_else(|| NO_FINAL_RESPONSE.to_string());

        let history = self.append_turn(fingerprint, message, &response).await;
        Ok(BatchReply { response, history })
    }

    /// Runs a turn, yielding a fragment per event and a final `Done`.
    ///
    /// Lookup and validation happen before the stream is returned. The turn
    /// runs on its own task and is saved to the transcript even if the
    /// returned stream is dropped early.
    pub fn chat_stream(
        &self,
        fingerprint: &Fingerprint,
        message: &str,
    ) -> DptbResult<impl Stream<Item = StreamUpdate> + Send + 'static> {
        let (agent, conversation) = self.prepare(fingerprint, message)?;
        info!(session = %fingerprint.short(), agent = %agent.name, "Streaming chat turn");

        let this = self.clone();
        let fingerprint = fingerprint.clone();
        let message = message.to_string();
        let mut events = self.runner.run(agent, conversation, message.clone());
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut rendered = String::new();
            let mut attached = true;
            while let Some(event) = events.next().await {
                let Some(fragment) = classify(&event) else {
                    continue;
                };
                rendered.push_str(&fragment.render());
                if attached {
                    let update = StreamUpdate::Fragment {
                        fragment,
                        response: rendered.trim().to_string(),
                    };
                    if tx.send(update).await.is_err() {
                        debug!(session = %fingerprint.short(), "Stream consumer gone");
                        attached = false;
                    }
                }
            }

            let history = this.append_turn(&fingerprint, &message, rendered.trim()).await;
            if attached {
                let done = StreamUpdate::Done {
                    history,
                    status: STATUS_DONE.to_string(),
                };
                if tx.send(done).await.is_err() {
                    debug!(session = %fingerprint.short(), "Stream consumer gone before done");
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Empties the saved transcript. The LLM-side conversation is kept.
    pub async fn clear(&self, fingerprint: &Fingerprint) -> DptbResult<String> {
        if !self.registry.contains(fingerprint) {
            return Err(DptbError::AgentNotFound);
        }
        self.transcripts.try_save(fingerprint, &[]).await?;
        info!(session = %fingerprint.short(), "Conversation cleared");
        Ok(STATUS_CLEARED.to_string())
    }
}
