use dptb_core::{DptbError, DptbResult};
use serde::{Deserialize, Serialize};

/// Environment variable holding the model id.
pub const ENV_MODEL_NAME: &str = "DEEPSEEK_MODEL_NAME";
/// Environment variable holding the API base URL.
pub const ENV_API_BASE: &str = "DEEPSEEK_API_BASE";
/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "DEEPSEEK_API_KEY";

/// Used when neither the config file nor the environment names a base URL.
pub const DEFAULT_API_BASE: &str = "https://api.deepseek.com/v1";

/// Provider prefixes accepted on model ids (`deepseek/deepseek-chat`).
/// The OpenAI-compatible wire format takes the bare id.
const PROVIDER_PREFIXES: &[&str] = &["deepseek/", "openai/"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    pub api_key: String,
    pub api_base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_turns() -> u32 {
    20
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }

    /// Model id as sent to the API, without any provider prefix.
    pub fn wire_model(&self) -> &str {
        PROVIDER_PREFIXES
            .iter()
            .find_map(|prefix| self.model_id.strip_prefix(prefix))
            .unwrap_or(&self.model_id)
    }
}

/// Partially specified model settings, as read from the `[model]` table of
/// the config file. Missing values fall back to the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model_id: Option<String>,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_turns: Option<u32>,
}

impl ModelSettings {
    /// Fills gaps from the process environment.
    pub fn resolve(self) -> DptbResult<ModelConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Fills gaps from `lookup`. A model id and an API key are required.
    pub fn resolve_with<F>(self, lookup: F) -> DptbResult<ModelConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let model_id = non_empty(self.model_id)
            .or_else(|| non_empty(lookup(ENV_MODEL_NAME)))
            .ok_or_else(|| {
                DptbError::Config(format!("no model configured: set {ENV_MODEL_NAME}"))
            })?;
        let api_key = non_empty(self.api_key)
            .or_else(|| non_empty(lookup(ENV_API_KEY)))
            .ok_or_else(|| {
                DptbError::Config(format!("no API key configured: set {ENV_API_KEY} or pass --api-key"))
            })?;
        let api_base_url = non_empty(self.api_base_url).or_else(|| non_empty(lookup(ENV_API_BASE)));

        Ok(ModelConfig {
            model_id,
            api_key,
            api_base_url,
            temperature: self.temperature.unwrap_or_else(default_temperature),
            max_tokens: self.max_tokens.unwrap_or_else(default_max_tokens),
            max_turns: self.max_turns.unwrap_or_else(default_max_turns),
        })
    }
}
