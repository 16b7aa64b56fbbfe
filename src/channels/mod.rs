//! Channel abstraction for chat I/O.
//!
//! A channel turns a chat platform into a stream of [`InboundEvent`]s and
//! delivers [`OutgoingMessage`]s (text plus optional inline buttons) to an
//! identity.

pub mod cli;
pub mod telegram;

pub use cli::CliChannel;
pub use telegram::TelegramChannel;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::domain::Identity;
use crate::error::ChannelError;

/// Stream of inbound events from a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A slash command, without the leading `/` (e.g. `start`).
    Command(String),
    /// An inline button press carrying its callback data.
    Callback {
        data: String,
        callback_id: Option<String>,
    },
    /// Any other text message.
    Text(String),
}

/// One event from a chat user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub identity: Identity,
    pub username: Option<String>,
    /// First name (or similar) from the chat profile.
    pub display_name: Option<String>,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn new(identity: impl Into<Identity>, kind: EventKind) -> Self {
        Self {
            identity: identity.into(),
            username: None,
            display_name: None,
            kind,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// An inline button; `data` is the encoded callback action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// A message to deliver to one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    /// Keyboard rows.
    pub buttons: Vec<Vec<Button>>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }

    /// Append a row of buttons.
    pub fn row(mut self, row: Vec<Button>) -> Self {
        if !row.is_empty() {
            self.buttons.push(row);
        }
        self
    }

    /// Append a single-button row.
    pub fn button(self, label: impl Into<String>, data: impl Into<String>) -> Self {
        self.row(vec![Button::new(label, data)])
    }

    /// Every button's callback data, in display order.
    pub fn button_data(&self) -> impl Iterator<Item = &str> {
        self.buttons.iter().flatten().map(|b| b.data.as_str())
    }
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start listening. Events arrive on the returned stream until the
    /// channel stops.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Deliver a message to an identity.
    async fn send(&self, to: &Identity, message: OutgoingMessage) -> Result<(), ChannelError>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn acknowledge(&self, _event: &InboundEvent) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}

/// Classify a raw text message as a command or plain text.
///
/// `/start@my_bot args` → `Command("start")`.
pub fn classify_text(text: &str) -> EventKind {
    let trimmed = text.trim();
    match trimmed.strip_prefix('/') {
        Some(rest) if !rest.is_empty() => {
            let word = rest.split_whitespace().next().unwrap_or_default();
            let command = word.split('@').next().unwrap_or_default();
            EventKind::Command(command.to_lowercase())
        }
        _ => EventKind::Text(trimmed.to_string()),
    }
}
