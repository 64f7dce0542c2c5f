use dptb_core::{DptbResult, Fingerprint};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Live agent instances keyed by session fingerprint.
///
/// Entries are never evicted; the registry is created at process start and
/// emptied with [`AgentRegistry::clear`] at shutdown. At most one instance
/// exists per fingerprint, even when two logins race.
pub struct AgentRegistry<A> {
    agents: RwLock<HashMap<Fingerprint, Arc<A>>>,
}

impl<A> AgentRegistry<A> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<A>> {
        self.agents.read().get(fingerprint).cloned()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.agents.read().contains_key(fingerprint)
    }

    /// Returns the cached agent, or builds one with `create` and caches it.
    ///
    /// `create` runs outside the lock. If it fails nothing is cached; if
    /// another caller inserted first, that instance wins and is returned.
    pub fn get_or_try_insert_with<F>(&self, fingerprint: &Fingerprint, create: F) -> DptbResult<Arc<A>>
    where
        F: FnOnce() -> DptbResult<A>,
    {
        if let Some(existing) = self.get(fingerprint) {
            debug!(session = %fingerprint.short(), "Reusing cached agent");
            return Ok(existing);
        }
        let created = Arc::new(create()?);
        let mut agents = self.agents.write();
        let entry = agents
            .entry(fingerprint.clone())
            .or_insert_with(|| {
                info!(session = %fingerprint.short(), "Agent cached");
                created
            })
            .clone();
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// Drops every cached agent.
    pub fn clear(&self) {
        let mut agents = self.agents.write();
        info!(count = agents.len(), "Clearing agent registry");
        agents.clear();
    }
}

impl<A> Default for AgentRegistry<A> {
    fn default() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }
}
