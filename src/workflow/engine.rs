//! The workflow engine: consumes chat events and drives the consultation
//! lifecycle.

use std::sync::Arc;

use futures::StreamExt;

use crate::channels::{Channel, EventKind, InboundEvent, OutgoingMessage};
use crate::conversation::{ConversationState, ConversationStore};
use crate::domain::{Account, AccountRole, ConsultationRequest, ConsultationSession, Identity};
use crate::error::{Error, WorkflowError};
use crate::notify::{LinkStatus, Notifier};
use crate::store::Database;

use super::action::Action;
use super::views;

/// Result of a single handler.
pub(super) type Outcome = Result<(), WorkflowError>;

/// One inbound event together with the account behind it, loaded once per
/// event.
pub(super) struct Turn<'a> {
    pub event: &'a InboundEvent,
    pub account: Option<Account>,
}

impl Turn<'_> {
    pub fn identity(&self) -> &Identity {
        &self.event.identity
    }

    /// The acting account, which must exist and be active.
    pub fn active(&self) -> Result<&Account, WorkflowError> {
        let account = self
            .account
            .as_ref()
            .ok_or_else(|| WorkflowError::forbidden("Please register first with /start."))?;
        if !account.is_active() {
            return Err(WorkflowError::forbidden("Your account is not active."));
        }
        Ok(account)
    }

    /// The acting account, which must be active and hold `role`.
    pub fn require(&self, role: AccountRole) -> Result<&Account, WorkflowError> {
        let account = self.active()?;
        if account.role != role {
            return Err(WorkflowError::forbidden(format!(
                "This action is only available to {role}s."
            )));
        }
        Ok(account)
    }

    pub fn require_admin(&self) -> Result<&Account, WorkflowError> {
        match self.account.as_ref() {
            Some(a) if a.acts_as(AccountRole::Admin) => Ok(a),
            _ => Err(WorkflowError::forbidden(
                "This action is only available to the administrator.",
            )),
        }
    }
}

/// Processes events from one channel, one at a time.
pub struct Engine {
    pub(super) db: Arc<dyn Database>,
    pub(super) conversations: Arc<dyn ConversationStore>,
    pub(super) notifier: Notifier,
    channel: Arc<dyn Channel>,
    link: LinkStatus,
    admin_phrase: String,
}

impl Engine {
    pub fn new(
        db: Arc<dyn Database>,
        conversations: Arc<dyn ConversationStore>,
        channel: Arc<dyn Channel>,
        admin_phrase: impl Into<String>,
    ) -> Self {
        Self {
            db,
            conversations,
            notifier: Notifier::new(Arc::clone(&channel)),
            channel,
            link: LinkStatus::new(),
            admin_phrase: admin_phrase.into(),
        }
    }

    /// Share a link flag with the reporting side.
    pub fn with_link_status(mut self, link: LinkStatus) -> Self {
        self.link = link;
        self
    }

    pub fn link_status(&self) -> LinkStatus {
        self.link.clone()
    }

    /// Start the channel and handle events until the stream ends or Ctrl+C.
    pub async fn run(&self) -> Result<(), Error> {
        let mut events = self.channel.start().await?;
        self.link.set_running(true);
        tracing::info!(channel = self.channel.name(), "Consultation desk ready and listening");

        loop {
            let event = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                ev = events.next() => {
                    match ev {
                        Some(e) => e,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            self.handle(&event).await;
        }

        self.link.set_running(false);
        self.channel.shutdown().await?;
        Ok(())
    }

    /// Handle one event. Refusals are answered to the sender; nothing here
    /// fails the loop.
    pub async fn handle(&self, event: &InboundEvent) {
        if matches!(event.kind, EventKind::Callback { .. }) {
            self.notifier.acknowledge(event).await;
        }

        let outcome = match self.db.get_account_by_identity(&event.identity).await {
            Ok(account) => self.dispatch(&Turn { event, account }).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = outcome {
            match &e {
                WorkflowError::Database(db) => {
                    tracing::error!(identity = %event.identity, "Repository failure: {db}");
                }
                other => tracing::debug!(identity = %event.identity, "Refused: {other}"),
            }
            self.notifier
                .reply(&event.identity, OutgoingMessage::text(e.user_message()))
                .await;
        }
    }

    async fn dispatch(&self, turn: &Turn<'_>) -> Outcome {
        match &turn.event.kind {
            EventKind::Command(command) => match command.as_str() {
                "start" => self.start(turn).await,
                "menu" => self.menu(turn).await,
                "admin" => self.admin_panel(turn).await,
                other => {
                    tracing::debug!(command = other, "Unknown command");
                    self.reply(turn, OutgoingMessage::text("Unknown command. Use /start or /menu."))
                        .await;
                    Ok(())
                }
            },
            EventKind::Callback { data, .. } => match Action::parse(data) {
                Some(action) => self.on_action(turn, action).await,
                None => {
                    tracing::debug!(data = %data, "Ignoring unknown callback data");
                    Ok(())
                }
            },
            EventKind::Text(text) => self.on_text(turn, text).await,
        }
    }

    async fn on_action(&self, turn: &Turn<'_>, action: Action) -> Outcome {
        match action {
            Action::BotHelp => {
                self.reply(turn, views::help()).await;
                Ok(())
            }
            Action::RegisterClient => self.begin_registration(turn, AccountRole::Client).await,
            Action::RegisterConsultant => {
                self.begin_registration(turn, AccountRole::Consultant).await
            }
            Action::MyProfile => self.profile(turn).await,
            Action::BackToMenu => self.menu(turn).await,

            Action::CreateRequest => self.begin_request(turn).await,
            Action::MyRequests => self.my_requests(turn).await,
            Action::ViewRequest(id) => self.view_request(turn, id).await,
            Action::CancelRequest(id) => self.client_cancel(turn, id).await,
            Action::AcceptTime(id) => self.accept_proposed_time(turn, id).await,
            Action::RejectTime(id) => self.begin_counter_offer(turn, id).await,

            Action::AvailableRequests => self.available_requests(turn).await,
            Action::TakeRequest(id) => self.take_request(turn, id).await,
            Action::MyTakenRequests => self.my_taken_requests(turn).await,
            Action::ProposeTime(id) => self.begin_propose_time(turn, id).await,
            Action::ReturnRequest(id) => self.return_request(turn, id).await,
            Action::AcceptClientTime(id) => self.accept_client_time(turn, id).await,

            Action::MySessions(party) => self.my_sessions(turn, party).await,
            Action::ConfirmSession {
                session_id,
                happened,
            } => self.confirm_session(turn, session_id, happened).await,
            Action::AskConfirm(id) => self.ask_confirmation(turn, id).await,

            Action::Admin(admin) => self.admin_action(turn, admin).await,
        }
    }

    async fn on_text(&self, turn: &Turn<'_>, text: &str) -> Outcome {
        if text.trim() == self.admin_phrase {
            return self.claim_admin(turn).await;
        }

        match self.conversations.get(turn.identity()).await {
            Some(ConversationState::Registration(step)) => {
                self.registration_step(turn, step, text).await
            }
            Some(ConversationState::RequestCreation(draft)) => {
                self.request_draft_step(turn, draft, text).await
            }
            Some(ConversationState::ProposeTime { request_id }) => {
                self.submit_proposed_time(turn, request_id, text).await
            }
            Some(ConversationState::CounterOffer { request_id }) => {
                self.submit_counter_offer(turn, request_id, text).await
            }
            Some(ConversationState::ConfirmReset) | None => {
                let hint = if turn.account.is_some() {
                    "Use /menu to navigate."
                } else {
                    "Use /start to begin."
                };
                self.reply(turn, OutgoingMessage::text(hint)).await;
                Ok(())
            }
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn start(&self, turn: &Turn<'_>) -> Outcome {
        if let Some(account) = &turn.account {
            if account.is_admin() {
                self.reply(turn, views::admin_welcome(account)).await;
            } else if account.is_active() {
                return self.menu(turn).await;
            } else {
                self.reply(turn, views::account_state(account)).await;
            }
            return Ok(());
        }

        let settings = self.db.get_settings().await?;
        let msg = if settings.registration_enabled {
            views::welcome()
        } else {
            views::registration_closed()
        };
        self.reply(turn, msg).await;
        Ok(())
    }

    async fn menu(&self, turn: &Turn<'_>) -> Outcome {
        let msg = match turn.account.as_ref().filter(|a| a.is_active()) {
            Some(a) => match a.role {
                AccountRole::Admin => views::admin_panel(),
                AccountRole::Client => views::client_menu(a),
                AccountRole::Consultant => views::consultant_menu(a),
                AccountRole::Guest => OutgoingMessage::text("Please register first with /start."),
            },
            None => OutgoingMessage::text("Please register first with /start."),
        };
        self.reply(turn, msg).await;
        Ok(())
    }

    async fn profile(&self, turn: &Turn<'_>) -> Outcome {
        let account = turn
            .account
            .as_ref()
            .ok_or_else(|| WorkflowError::forbidden("Please register first with /start."))?;
        self.reply(turn, views::profile(account)).await;
        Ok(())
    }

    // ── Shared helpers ──────────────────────────────────────────────

    pub(super) async fn reply(&self, turn: &Turn<'_>, message: OutgoingMessage) {
        self.notifier.reply(turn.identity(), message).await;
    }

    pub(super) async fn load_request(&self, id: i64) -> Result<ConsultationRequest, WorkflowError> {
        self.db
            .get_request(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Request not found."))
    }

    pub(super) async fn load_session(&self, id: i64) -> Result<ConsultationSession, WorkflowError> {
        self.db
            .get_session(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Consultation not found."))
    }

    pub(super) async fn load_account(&self, id: i64) -> Result<Account, WorkflowError> {
        self.db
            .get_account(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("User not found."))
    }

    /// Look up an account that is only needed for display or notification.
    pub(super) async fn account(&self, id: Option<i64>) -> Result<Option<Account>, WorkflowError> {
        match id {
            Some(id) => Ok(self.db.get_account(id).await?),
            None => Ok(None),
        }
    }
}
