//! Conversation state for multi-step chat flows.

pub mod state;
pub mod store;

pub use state::{ConversationState, RegistrationStep, RequestDraft, optional_answer};
pub use store::{ConversationStore, InMemoryConversationStore};
