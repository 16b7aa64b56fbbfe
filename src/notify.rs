//! Outbound delivery on top of a [`Channel`].
//!
//! Delivery is best effort: a failed send is logged and dropped, and never
//! rolls back or retries the state change that triggered it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::channels::{Channel, InboundEvent, OutgoingMessage};
use crate::domain::{Account, Identity};

/// Whether the engine's messaging link is currently live.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus(Arc<AtomicBool>);

impl LinkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.0.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sends replies and third-party notifications through the active channel.
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn Channel>,
}

impl Notifier {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Answer the user who triggered the current event.
    pub async fn reply(&self, to: &Identity, message: OutgoingMessage) {
        if let Err(e) = self.channel.send(to, message).await {
            tracing::warn!(%to, channel = self.channel.name(), "Reply not delivered: {e}");
        }
    }

    /// Tell another party about something that happened.
    pub async fn notify(&self, to: &Identity, message: OutgoingMessage) {
        if let Err(e) = self.channel.send(to, message).await {
            tracing::warn!(%to, channel = self.channel.name(), "Notification not delivered: {e}");
        }
    }

    /// Notify an account, if it is known.
    pub async fn notify_account(&self, account: Option<&Account>, message: OutgoingMessage) {
        if let Some(account) = account {
            self.notify(&account.identity, message).await;
        }
    }

    /// Stop the button spinner for a callback event.
    pub async fn acknowledge(&self, event: &InboundEvent) {
        if let Err(e) = self.channel.acknowledge(event).await {
            tracing::debug!(identity = %event.identity, "Callback not acknowledged: {e}");
        }
    }
}
