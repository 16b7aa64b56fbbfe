//! Conversation states: which multi-step flow an identity is in and the
//! fields collected so far.

use serde::{Deserialize, Serialize};

/// Registration wizard steps. Each variant carries only the answers already
/// given.
///
/// Client: name → description → contact.
/// Consultant: name → competencies → experience → timezone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RegistrationStep {
    ClientName,
    ClientDescription {
        full_name: String,
    },
    ClientContact {
        full_name: String,
        description: Option<String>,
    },
    ConsultantName,
    ConsultantCompetencies {
        full_name: String,
    },
    ConsultantExperience {
        full_name: String,
        competencies: String,
    },
    ConsultantTimezone {
        full_name: String,
        competencies: String,
        experience: Option<String>,
    },
}

impl RegistrationStep {
    /// The question shown when entering this step.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::ClientName | Self::ConsultantName => "Please enter your full name:",
            Self::ClientDescription { .. } => {
                "Briefly describe what you would like to consult about (or send - to skip):"
            }
            Self::ClientContact { .. } => {
                "Leave a phone number or e-mail for contact (or send - to skip):"
            }
            Self::ConsultantCompetencies { .. } => {
                "List your areas of expertise (e.g. tax law, accounting, marketing):"
            }
            Self::ConsultantExperience { .. } => {
                "Describe your experience (or send - to skip):"
            }
            Self::ConsultantTimezone { .. } => "Which time zone do you work in? (e.g. UTC+3)",
        }
    }
}

/// Request-creation wizard: topic → preferred time → details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RequestDraft {
    Topic,
    PreferredTime {
        topic: String,
    },
    Details {
        topic: String,
        preferred_time: Option<String>,
    },
}

impl RequestDraft {
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Topic => "What is the topic of the consultation?",
            Self::PreferredTime { .. } => {
                "When would suit you? (e.g. 2026-03-15 14:00, or send - to skip)"
            }
            Self::Details { .. } => "Any details for the consultant? (or send - to skip)",
        }
    }
}

/// Where an identity currently is in a multi-step chat flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum ConversationState {
    Registration(RegistrationStep),
    RequestCreation(RequestDraft),
    /// Consultant is typing a time to propose for the request.
    ProposeTime { request_id: i64 },
    /// Client is typing a counter-offer time for the request.
    CounterOffer { request_id: i64 },
    /// Admin has been shown the reset warning and must confirm.
    ConfirmReset,
}

impl ConversationState {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registration(_) => "registration",
            Self::RequestCreation(_) => "request_creation",
            Self::ProposeTime { .. } => "propose_time",
            Self::CounterOffer { .. } => "counter_offer",
            Self::ConfirmReset => "confirm_reset",
        }
    }

    /// Whether this state consumes free-text replies.
    pub fn expects_text(&self) -> bool {
        !matches!(self, Self::ConfirmReset)
    }
}

/// Interpret a reply to an optional question: `-` or blank means "skip".
pub fn optional_answer(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" {
        None
    } else {
        Some(trimmed.to_string())
    }
}
