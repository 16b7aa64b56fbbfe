//! Consultation sessions and the two-party confirmation protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::ConsultationRequest;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Disagreement,
    NotHappened,
    Cancelled,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        Self::Scheduled,
        Self::Completed,
        Self::Disagreement,
        Self::NotHappened,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Disagreement => "disagreement",
            Self::NotHappened => "not_happened",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Completed => "Held (confirmed by both sides)",
            Self::Disagreement => "Confirmations disagree",
            Self::NotHappened => "Did not take place",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Every status except `scheduled` is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Scheduled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "disagreement" => Ok(Self::Disagreement),
            "not_happened" => Ok(Self::NotHappened),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Which side of a session an account is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Client,
    Consultant,
}

impl Party {
    pub fn other(&self) -> Party {
        match self {
            Self::Client => Self::Consultant,
            Self::Consultant => Self::Client,
        }
    }
}

/// Resolve a session from both confirmation flags.
///
/// Stays `scheduled` until both sides have answered; a split answer is a
/// final `disagreement`, not a retry.
pub fn resolve(client: Option<bool>, consultant: Option<bool>) -> SessionStatus {
    match (client, consultant) {
        (Some(true), Some(true)) => SessionStatus::Completed,
        (Some(false), Some(false)) => SessionStatus::NotHappened,
        (Some(_), Some(_)) => SessionStatus::Disagreement,
        _ => SessionStatus::Scheduled,
    }
}

/// A scheduled consultation created from an accepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationSession {
    pub id: i64,
    pub request_id: i64,
    pub client_id: i64,
    pub consultant_id: i64,
    /// Agreed time, free text as typed by the participants.
    pub scheduled_at: String,
    pub topic: String,
    pub status: SessionStatus,
    pub client_confirmed: Option<bool>,
    pub consultant_confirmed: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl ConsultationSession {
    pub fn party_of(&self, account_id: i64) -> Option<Party> {
        if self.client_id == account_id {
            Some(Party::Client)
        } else if self.consultant_id == account_id {
            Some(Party::Consultant)
        } else {
            None
        }
    }

    pub fn confirmation_of(&self, party: Party) -> Option<bool> {
        match party {
            Party::Client => self.client_confirmed,
            Party::Consultant => self.consultant_confirmed,
        }
    }

    pub fn account_of(&self, party: Party) -> i64 {
        match party {
            Party::Client => self.client_id,
            Party::Consultant => self.consultant_id,
        }
    }

    /// Status implied by the current confirmation flags.
    pub fn resolution(&self) -> SessionStatus {
        resolve(self.client_confirmed, self.consultant_confirmed)
    }
}

/// Fields for inserting a new session. New sessions are always `scheduled`
/// with both confirmations unset.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub request_id: i64,
    pub client_id: i64,
    pub consultant_id: i64,
    pub scheduled_at: String,
    pub topic: String,
}

impl NewSession {
    /// Mirror a request at the moment it becomes scheduled.
    ///
    /// Returns `None` when the request has no consultant or no agreed time.
    pub fn from_request(request: &ConsultationRequest) -> Option<Self> {
        let consultant_id = request.consultant_id?;
        let scheduled_at = request
            .preferred_time
            .as_deref()
            .filter(|t| !t.trim().is_empty())?
            .to_string();
        Some(Self {
            request_id: request.id,
            client_id: request.client_id,
            consultant_id,
            scheduled_at,
            topic: request.topic.clone(),
        })
    }
}
