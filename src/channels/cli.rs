//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Input lines:
//! - `/start`: a command;
//! - `#take_request_3`: a button press with that callback data;
//! - `@42 /menu`: act as identity `42` from now on, then handle the rest;
//! - anything else: plain text.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::channels::{Channel, EventKind, EventStream, InboundEvent, OutgoingMessage, classify_text};
use crate::domain::Identity;
use crate::error::ChannelError;

/// Identity used until the operator switches with `@id`.
const DEFAULT_IDENTITY: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            let mut lines = reader.lines();
            let mut current = DEFAULT_IDENTITY.to_string();

            eprint!("[{current}] > ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_line(&line, &mut current) {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        eprint!("[{current}] > ");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send(&self, to: &Identity, message: OutgoingMessage) -> Result<(), ChannelError> {
        println!("\n→ {to}\n{}", message.text);
        for row in &message.buttons {
            let rendered: Vec<String> = row
                .iter()
                .map(|b| format!("[{}] #{}", b.label, b.data))
                .collect();
            println!("  {}", rendered.join("   "));
        }
        println!();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Parse one input line, updating the acting identity on an `@id` prefix.
fn parse_line(line: &str, current: &mut String) -> Option<InboundEvent> {
    let mut rest = line.trim();
    if let Some(switch) = rest.strip_prefix('@') {
        let (id, tail) = switch.split_once(char::is_whitespace).unwrap_or((switch, ""));
        if !id.is_empty() {
            *current = id.to_string();
        }
        rest = tail.trim();
    }
    if rest.is_empty() {
        return None;
    }

    let kind = match rest.strip_prefix('#') {
        Some(data) => EventKind::Callback {
            data: data.to_string(),
            callback_id: None,
        },
        None => classify_text(rest),
    };

    Some(
        InboundEvent::new(current.clone(), kind)
            .with_username(current.clone())
            .with_display_name(current.clone()),
    )
}
