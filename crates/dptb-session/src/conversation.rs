use chrono::{DateTime, Utc};
use dptb_core::{Fingerprint, Message};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// LLM-side message history of one user session.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub app_name: String,
    pub user_id: String,
    pub session_id: Fingerprint,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>, session_id: Fingerprint) -> Self {
        let now = Utc::now();
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// A conversation locked for the duration of a turn.
pub type SharedConversation = Arc<tokio::sync::Mutex<Conversation>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ConversationKey {
    app_name: String,
    user_id: String,
    session_id: Fingerprint,
}

/// In-memory conversation sessions, created lazily and kept until
/// [`ConversationService::clear`].
#[derive(Default)]
pub struct ConversationService {
    sessions: RwLock<HashMap<ConversationKey, SharedConversation>>,
}

impl ConversationService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the conversation for this key, creating an empty one on first use.
    pub fn get_or_create(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &Fingerprint,
    ) -> SharedConversation {
        let key = ConversationKey {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.clone(),
        };
        if let Some(existing) = self.sessions.read().get(&key) {
            return existing.clone();
        }
        self.sessions
            .write()
            .entry(key)
            .or_insert_with(|| {
                debug!(user_id, session = %session_id.short(), "Conversation created");
                Arc::new(tokio::sync::Mutex::new(Conversation::new(
                    app_name,
                    user_id,
                    session_id.clone(),
                )))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drops every conversation. Called at shutdown.
    pub fn clear(&self) {
        self.sessions.write().clear();
    }
}
