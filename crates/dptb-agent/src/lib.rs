//! The DeePTB agent: an LLM tool-calling loop over the remote calculation
//! tools.

pub mod backends;
pub mod config;
pub mod event;
pub mod factory;
pub mod llm;
pub mod runner;

pub use config::{ModelConfig, ModelSettings};
pub use event::AgentEvent;
pub use factory::{AgentFactory, AgentMode, LlmAgent};
pub use llm::{LlmClient, LlmResponse};
pub use runner::{AgentRunner, EventStream, LlmRunner};
