//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text messages and inline-keyboard presses (`callback_query`) become
//! [`InboundEvent`]s; outgoing messages carry an `inline_keyboard` when they
//! have buttons. In private chats the user id doubles as the chat id, so the
//! identity is all that is needed to reply.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::{
    Channel, EventKind, EventStream, InboundEvent, OutgoingMessage, classify_text,
};
use crate::domain::Identity;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Default long-poll timeout for getUpdates, in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    async fn post(&self, method: &str, body: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let err = resp.text().await.unwrap_or_default();
        Err(ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method} returned {status}: {err}"),
        })
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let timeout = self.poll_timeout_secs;
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": timeout,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let results = match update_results(&data) {
                    Ok(r) => r,
                    Err(reason) => {
                        tracing::warn!("Telegram getUpdates failed: {reason}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(event) = parse_update(update) else {
                        continue;
                    };

                    if !is_sender_allowed(&allowed_users, &event) {
                        tracing::warn!(
                            identity = %event.identity,
                            username = event.username.as_deref().unwrap_or("unknown"),
                            "Telegram: ignoring update from unauthorized user"
                        );
                        continue;
                    }

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send(&self, to: &Identity, message: OutgoingMessage) -> Result<(), ChannelError> {
        let chunks = split_message(&message.text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({
                "chat_id": to.as_str(),
                "text": chunk,
            });
            if i == last && !message.buttons.is_empty() {
                body["reply_markup"] = reply_markup(&message);
            }
            self.post("sendMessage", &body).await?;
        }
        Ok(())
    }

    async fn acknowledge(&self, event: &InboundEvent) -> Result<(), ChannelError> {
        if let EventKind::Callback {
            callback_id: Some(id),
            ..
        } = &event.kind
        {
            self.post("answerCallbackQuery", &json!({ "callback_query_id": id }))
                .await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Turn one `getUpdates` entry into an event. Updates that are neither a
/// text message nor a callback with data are skipped.
fn parse_update(update: &Value) -> Option<InboundEvent> {
    let (from, kind) = if let Some(query) = update.get("callback_query") {
        let data = query.get("data").and_then(Value::as_str)?;
        let callback_id = query.get("id").and_then(Value::as_str).map(String::from);
        (
            query.get("from")?,
            EventKind::Callback {
                data: data.to_string(),
                callback_id,
            },
        )
    } else {
        let message = update.get("message")?;
        let text = message.get("text").and_then(Value::as_str)?;
        (message.get("from")?, classify_text(text))
    };

    let user_id = from.get("id").and_then(Value::as_i64)?;
    let mut event = InboundEvent::new(user_id.to_string(), kind);
    if let Some(username) = from.get("username").and_then(Value::as_str) {
        event = event.with_username(username);
    }
    if let Some(first_name) = from.get("first_name").and_then(Value::as_str) {
        event = event.with_display_name(first_name);
    }
    Some(event)
}

/// `reply_markup` JSON for a message's buttons.
fn reply_markup(message: &OutgoingMessage) -> Value {
    let rows: Vec<Vec<Value>> = message
        .buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// The `result` array of a `getUpdates` reply, or the API's error
/// description when the call was refused.
fn update_results(data: &Value) -> Result<&Vec<Value>, String> {
    if let Some(results) = data.get("result").and_then(Value::as_array) {
        return Ok(results);
    }
    let description = data
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("response has no result");
    Err(match data.get("error_code").and_then(Value::as_i64) {
        Some(code) => format!("{code} {description}"),
        None => description.to_string(),
    })
}

/// Whether the sender's numeric id or username is on the allowlist.
fn is_sender_allowed(allowed_users: &[String], event: &InboundEvent) -> bool {
    allowed_users.iter().any(|u| {
        u == "*" || u == event.identity.as_str() || event.username.as_deref() == Some(u.as_str())
    })
}

/// Split a message into chunks that fit Telegram's limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
