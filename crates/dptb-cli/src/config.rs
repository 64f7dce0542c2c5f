//! `dptb-agent.toml` and its merge with command-line flags.

use dptb_agent::ModelSettings;
use dptb_mcp::JobResources;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file read when `--config` is not given. Its absence is not an error.
pub const DEFAULT_CONFIG_FILE: &str = "dptb-agent.toml";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 50005;
pub const DEFAULT_TOOL_ENDPOINT: &str = "http://0.0.0.0:50001/sse";
pub const DEFAULT_MODE: &str = "local";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub model: ModelSettings,
    pub tools: ToolsSection,
    pub history: HistorySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// SSE URL of the calculation tool server.
    pub endpoint: Option<String>,
    #[serde(flatten)]
    pub resources: JobResources,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `explicit` (which must exist) or else the default file if present.
    pub async fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !tokio::fs::try_exists(&default).await.unwrap_or(false) {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        Self::parse(&text)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
    }
}

/// Resolved runtime settings, flags over file over defaults.
#[derive(Debug)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub tool_endpoint: String,
    pub mode: String,
    pub history_dir: PathBuf,
    pub resources: JobResources,
    pub model: ModelSettings,
}

/// Command-line values that override the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tool_endpoint: Option<String>,
    pub mode: Option<String>,
    pub history_dir: Option<PathBuf>,
    pub api_key: Option<String>,
}

impl Settings {
    pub fn merge(file: FileConfig, flags: Overrides) -> Self {
        let mut model = file.model;
        if flags.api_key.is_some() {
            model.api_key = flags.api_key;
        }
        Self {
            host: flags
                .host
                .or(file.server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: flags.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
            tool_endpoint: flags
                .tool_endpoint
                .or(file.tools.endpoint)
                .unwrap_or_else(|| DEFAULT_TOOL_ENDPOINT.to_string()),
            mode: flags
                .mode
                .or(file.server.mode)
                .unwrap_or_else(|| DEFAULT_MODE.to_string()),
            history_dir: flags
                .history_dir
                .or(file.history.dir)
                .unwrap_or_else(|| PathBuf::from(dptb_session::FileTranscriptStore::DEFAULT_DIR)),
            resources: file.tools.resources,
            model,
        }
    }
}
