//! Session state for the DeePTB agent front-end: persisted chat transcripts,
//! in-memory LLM conversations and the registry of live agents.

pub mod conversation;
pub mod registry;
pub mod transcript;

pub use conversation::{Conversation, ConversationService, SharedConversation};
pub use registry::AgentRegistry;
pub use transcript::{FileTranscriptStore, Transcript, TranscriptLoad, TranscriptStore, Turn};
