//! Builds one agent per credential set.

use crate::llm::LlmClient;
use dptb_core::{Credentials, DptbError, DptbResult, Toolset};
use dptb_mcp::{CalculationToolset, JobResources, RemoteBackends};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Where the user's project files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Files sit on remote Bohrium nodes the agent cannot read.
    Bohrium,
    /// Files sit on the local machine.
    Local,
}

impl FromStr for AgentMode {
    type Err = DptbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bohr" | "bohrium" => Ok(Self::Bohrium),
            "local" => Ok(Self::Local),
            other => Err(DptbError::Config(format!(
                "unknown mode '{other}', expected 'bohr' or 'local'"
            ))),
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bohrium => f.write_str("bohr"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// An LLM agent bound to one user's calculation tools.
pub struct LlmAgent {
    pub name: String,
    pub description: String,
    pub instruction: String,
    /// Username the conversation is filed under.
    pub user_id: String,
    pub llm: LlmClient,
    pub tools: Arc<dyn Toolset>,
}

impl fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmAgent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("user_id", &self.user_id)
            .field("tools", &self.tools.name())
            .finish()
    }
}

/// System instruction for `credentials` in `mode`.
pub fn instruction(credentials: &Credentials, mode: AgentMode) -> String {
    let preamble = format!(
        "You are an expert in materials science and computational chemistry. \
         Help user {} execute DeePTB tasks for project {}. ",
        credentials.username, credentials.project_id
    );
    let files = match mode {
        AgentMode::Bohrium => format!(
            "You are currently in Bohrium integrated mode: when you use the MCP tools, \
             tasks run on Bohrium nodes, so file inputs refer to paths on those nodes. \
             The path is {}; use it as the file path for MCP tools unless the user gives you another path. \
             You cannot access files on Bohrium nodes, but you should guide the user to check their Bohrium storage. ",
            credentials.file_path
        ),
        AgentMode::Local => format!("Project files are stored at: {}. ", credentials.file_path),
    };
    format!(
        "{preamble}{files}Use default parameters if the user does not mention them, \
         but let the user confirm them before submission. \
         Always verify the input parameters with the user and provide clear explanations of results."
    )
}

/// Creates agents. Nothing is contacted here: the tool endpoint is reached on
/// the agent's first tool use.
pub struct AgentFactory {
    llm: LlmClient,
    resources: JobResources,
}

impl AgentFactory {
    pub fn new(llm: LlmClient, resources: JobResources) -> Self {
        Self { llm, resources }
    }

    pub fn create(
        &self,
        credentials: &Credentials,
        tool_endpoint: &str,
        mode: AgentMode,
    ) -> DptbResult<LlmAgent> {
        let fingerprint = credentials.fingerprint();
        let backends = RemoteBackends::from_credentials(credentials, &self.resources)?;
        let tools = CalculationToolset::new(tool_endpoint, backends)?;

        let agent = LlmAgent {
            name: format!("deeptb_agent_{}", fingerprint.agent_tag()),
            description: format!("DeePTB agent for project {}.", credentials.project_id),
            instruction: instruction(credentials, mode),
            user_id: credentials.username.clone(),
            llm: self.llm.clone(),
            tools: Arc::new(tools),
        };
        info!(agent = %agent.name, %mode, endpoint = tool_endpoint, "Agent created");
        Ok(agent)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    fn factory() -> AgentFactory {
        let llm = LlmClient::new(ModelConfig {
            model_id: "deepseek-chat".into(),
            api_key: "sk".into(),
            api_base_url: None,
            temperature: 0.7,
            max_tokens: 1024,
            max_turns: 8,
        });
        AgentFactory::new(llm, JobResources::default())
    }

    fn creds() -> Credentials {
        Credentials::new("alice", "secret", "123", "/personal")
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("bohr".parse::<AgentMode>().unwrap(), AgentMode::Bohrium);
        assert_eq!("Bohrium".parse::<AgentMode>().unwrap(), AgentMode::Bohrium);
        assert_eq!("local".parse::<AgentMode>().unwrap(), AgentMode::Local);
        let err = "cloud".parse::<AgentMode>().unwrap_err();
        assert!(matches!(err, DptbError::Config(_)));
    }

    #[test]
    fn test_agent_identity() {
        let agent = factory()
            .create(&creds(), "http://0.0.0.0:50001/sse", AgentMode::Local)
            .unwrap();
        let fp = creds().fingerprint();
        assert_eq!(agent.name, format!("deeptb_agent_{}", &fp.as_str()[..8]));
        assert_eq!(agent.description, "DeePTB agent for project 123.");
        assert_eq!(agent.user_id, "alice");
        assert_eq!(agent.tools.name(), "http://0.0.0.0:50001/sse");
    }

    #[test]
    fn test_instructions_per_mode() {
        let local = instruction(&creds(), AgentMode::Local);
        assert!(local.starts_with("You are an expert in materials science and computational chemistry."));
        assert!(local.contains("Help user alice execute DeePTB tasks for project 123."));
        assert!(local.contains("Project files are stored at: /personal."));
        assert!(!local.contains("Bohrium"));

        let remote = instruction(&creds(), AgentMode::Bohrium);
        assert!(remote.contains("Bohrium integrated mode"));
        assert!(remote.contains("The path is /personal"));
        assert!(remote.contains("cannot access files on Bohrium nodes"));
        assert!(remote.contains("confirm them before submission"));
    }

    #[test]
    fn test_bad_project_id_fails_construction() {
        let mut c = creds();
        c.project_id = "abc".into();
        let err = factory()
            .create(&c, "http://0.0.0.0:50001/sse", AgentMode::Bohrium)
            .unwrap_err();
        assert!(matches!(err, DptbError::Config(_)));
    }

    #[test]
    fn test_bad_endpoint_fails_construction() {
        let err = factory()
            .create(&creds(), "::not-a-url", AgentMode::Local)
            .unwrap_err();
        assert!(matches!(err, DptbError::Config(_)));
    }
}
