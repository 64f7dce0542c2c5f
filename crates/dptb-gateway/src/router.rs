use dptb_agent::{AgentFactory, AgentMode, LlmAgent};
use dptb_core::{Credentials, DptbError, DptbResult, Fingerprint};
use dptb_session::{AgentRegistry, Transcript, TranscriptLoad, TranscriptStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful login.
pub struct LoginOutcome {
    pub agent: Arc<LlmAgent>,
    pub fingerprint: Fingerprint,
    pub status: String,
    pub transcript: Transcript,
}

/// Maps credentials to their agent, creating it on first login.
pub struct SessionRouter {
    registry: Arc<AgentRegistry<LlmAgent>>,
    factory: Arc<AgentFactory>,
    transcripts: Arc<dyn TranscriptStore>,
}

impl SessionRouter {
    pub fn new(
        registry: Arc<AgentRegistry<LlmAgent>>,
        factory: Arc<AgentFactory>,
        transcripts: Arc<dyn TranscriptStore>,
    ) -> Self {
        Self {
            registry,
            factory,
            transcripts,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry<LlmAgent>> {
        &self.registry
    }

    pub async fn get_or_create(
        &self,
        credentials: &Credentials,
        tool_endpoint: &str,
        mode: AgentMode,
    ) -> DptbResult<LoginOutcome> {
        credentials.validate()?;
        let fingerprint = credentials.fingerprint();

        let agent = self
            .registry
            .get_or_try_insert_with(&fingerprint, || {
                self.factory.create(credentials, tool_endpoint, mode)
            })
            .map_err(|e| {
                warn!(session = %fingerprint.short(), error = %e, "Agent construction failed");
                DptbError::AgentConstruction(e.to_string())
            })?;

        let transcript = match self.transcripts.load(&fingerprint).await {
            TranscriptLoad::Found(transcript) => transcript,
            TranscriptLoad::NotFound => Vec::new(),
            TranscriptLoad::ParseError(reason) | TranscriptLoad::Unreadable(reason) => {
                warn!(session = %fingerprint.short(), %reason, "Ignoring unreadable chat history");
                Vec::new()
            }
        };

        info!(
            session = %fingerprint.short(),
            agent = %agent.name,
            turns = transcript.len(),
            "Login"
        );

        Ok(LoginOutcome {
            status: format!(
                "Login successful! Session: {}... Project: {}",
                fingerprint.short(),
                credentials.project_id
            ),
            agent,
            fingerprint,
            transcript,
        })
    }
}
