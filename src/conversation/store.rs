//! Keyed storage for in-progress conversations.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::state::ConversationState;
use crate::domain::Identity;

/// Per-identity conversation state. Last write wins; entries never expire.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn set(&self, identity: &Identity, state: ConversationState);

    async fn get(&self, identity: &Identity) -> Option<ConversationState>;

    async fn clear(&self, identity: &Identity);

    /// Drop every in-progress conversation (administrative reset).
    async fn clear_all(&self);
}

/// Process-local store. State does not survive a restart.
#[derive(Default)]
pub struct InMemoryConversationStore {
    states: RwLock<HashMap<Identity, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn set(&self, identity: &Identity, state: ConversationState) {
        tracing::debug!(%identity, flow = state.name(), "Conversation state set");
        self.states.write().await.insert(identity.clone(), state);
    }

    async fn get(&self, identity: &Identity) -> Option<ConversationState> {
        self.states.read().await.get(identity).cloned()
    }

    async fn clear(&self, identity: &Identity) {
        self.states.write().await.remove(identity);
    }

    async fn clear_all(&self) {
        let mut states = self.states.write().await;
        let dropped = states.len();
        states.clear();
        tracing::info!(dropped, "All conversation states cleared");
    }
}
