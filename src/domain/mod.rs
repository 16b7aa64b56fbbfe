//! Domain model for accounts, consultation requests, sessions, and settings.
//!
//! The request and session lifecycles are explicit enums with their
//! transition rules attached, so handlers validate a move before touching the
//! repository.

pub mod account;
pub mod request;
pub mod session;
pub mod settings;

pub use account::{Account, AccountPatch, AccountRole, AccountStatus, NewAccount};
pub use request::{
    ConsultationRequest, IllegalTransition, NewRequest, RequestPatch, RequestStatus,
    RequestTransition,
};
pub use session::{ConsultationSession, NewSession, Party, SessionStatus, resolve};
pub use settings::{Settings, SettingsPatch};

use serde::{Deserialize, Serialize};

/// Opaque chat-platform user id.
///
/// For Telegram private chats this is also the chat id messages are
/// delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}
