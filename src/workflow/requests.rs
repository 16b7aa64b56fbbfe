//! Client and consultant handlers for the request lifecycle.
//!
//! Every transition is planned against the lifecycle table and then written
//! with a conditional update on the status it was planned from, so two
//! consultants racing for the same request cannot both win.

use crate::channels::OutgoingMessage;
use crate::conversation::{ConversationState, RequestDraft, optional_answer};
use crate::domain::{
    AccountRole, AccountStatus, ConsultationRequest, ConsultationSession, NewRequest, NewSession,
    RequestStatus, RequestTransition, SessionStatus,
};
use crate::error::WorkflowError;

use super::action::Action;
use super::engine::{Engine, Outcome, Turn};
use super::views;

fn menu_button(msg: OutgoingMessage) -> OutgoingMessage {
    msg.button("Menu", Action::BackToMenu.encode())
}

fn not_owner(what: &str) -> WorkflowError {
    WorkflowError::forbidden(format!("Only the client who created this request can {what}."))
}

fn not_assignee(what: &str) -> WorkflowError {
    WorkflowError::forbidden(format!("Only the assigned consultant can {what}."))
}

/// Refuse early when `transition` is not legal from the request's status.
fn ensure_allowed(
    request: &ConsultationRequest,
    transition: &RequestTransition,
) -> Result<(), WorkflowError> {
    request.status.apply(transition).map(|_| ()).map_err(|e| {
        tracing::debug!(request_id = request.id, "Rejected transition: {e}");
        WorkflowError::precondition(format!(
            "This is not possible while the request is in status \"{}\".",
            request.status.label()
        ))
    })
}

impl Engine {
    /// Apply `transition` if the request is still in the status it was
    /// loaded with.
    async fn transition(
        &self,
        request: &ConsultationRequest,
        transition: RequestTransition,
    ) -> Result<ConsultationRequest, WorkflowError> {
        ensure_allowed(request, &transition)?;
        let patch = request
            .plan(&transition)
            .map_err(|e| WorkflowError::precondition(e.to_string()))?;

        let updated = self
            .db
            .update_request_if(request.id, request.status, &patch)
            .await?
            .ok_or_else(|| WorkflowError::precondition("This request is no longer available."))?;

        tracing::info!(
            request_id = updated.id,
            from = %request.status,
            to = %updated.status,
            transition = transition.name(),
            "Request transition"
        );
        Ok(updated)
    }

    /// Move a request to `scheduled` and create its session in one store
    /// write. Only the caller whose conditional update wins gets a session,
    /// and a failed insert leaves the request where it was.
    async fn schedule(
        &self,
        request: &ConsultationRequest,
        transition: RequestTransition,
    ) -> Result<(ConsultationRequest, ConsultationSession), WorkflowError> {
        ensure_allowed(request, &transition)?;
        let new_session = NewSession::from_request(request).ok_or_else(|| {
            WorkflowError::precondition("No time has been agreed for this request yet.")
        })?;
        let patch = request
            .plan(&transition)
            .map_err(|e| WorkflowError::precondition(e.to_string()))?;

        let (updated, session) = self
            .db
            .schedule_request(request.id, request.status, &patch, &new_session)
            .await?
            .ok_or_else(|| WorkflowError::precondition("This request is no longer available."))?;

        tracing::info!(
            request_id = updated.id,
            session_id = session.id,
            from = %request.status,
            transition = transition.name(),
            scheduled_at = %session.scheduled_at,
            "Consultation scheduled"
        );
        Ok((updated, session))
    }

    // ── Client ──────────────────────────────────────────────────────

    pub(super) async fn begin_request(&self, turn: &Turn<'_>) -> Outcome {
        turn.require(AccountRole::Client)?;
        if !self.db.get_settings().await?.consultations_enabled {
            return Err(WorkflowError::precondition(
                "Booking consultations is paused right now. Please try again later.",
            ));
        }

        let draft = RequestDraft::Topic;
        self.reply(turn, OutgoingMessage::text(draft.prompt())).await;
        self.conversations
            .set(turn.identity(), ConversationState::RequestCreation(draft))
            .await;
        Ok(())
    }

    pub(super) async fn request_draft_step(
        &self,
        turn: &Turn<'_>,
        draft: RequestDraft,
        text: &str,
    ) -> Outcome {
        let next = match draft {
            RequestDraft::Topic => {
                let topic = text.trim();
                if topic.is_empty() {
                    self.reply(
                        turn,
                        OutgoingMessage::text(format!(
                            "The topic is required. {}",
                            RequestDraft::Topic.prompt()
                        )),
                    )
                    .await;
                    return Ok(());
                }
                RequestDraft::PreferredTime {
                    topic: topic.to_string(),
                }
            }
            RequestDraft::PreferredTime { topic } => RequestDraft::Details {
                topic,
                preferred_time: optional_answer(text),
            },
            RequestDraft::Details {
                topic,
                preferred_time,
            } => {
                return self
                    .create_request(turn, topic, preferred_time, optional_answer(text))
                    .await;
            }
        };

        self.reply(turn, OutgoingMessage::text(next.prompt())).await;
        self.conversations
            .set(turn.identity(), ConversationState::RequestCreation(next))
            .await;
        Ok(())
    }

    async fn create_request(
        &self,
        turn: &Turn<'_>,
        topic: String,
        preferred_time: Option<String>,
        details: Option<String>,
    ) -> Outcome {
        self.conversations.clear(turn.identity()).await;
        let client = turn.require(AccountRole::Client)?;
        if !self.db.get_settings().await?.consultations_enabled {
            return Err(WorkflowError::precondition(
                "Booking consultations is paused right now. Please try again later.",
            ));
        }

        let request = self
            .db
            .create_request(&NewRequest {
                client_id: client.id,
                topic,
                preferred_time,
                details,
            })
            .await?;
        tracing::info!(request_id = request.id, client_id = client.id, "Request created");

        self.reply(
            turn,
            menu_button(OutgoingMessage::text(format!(
                "Your request #{} \"{}\" has been created. Consultants have been notified.",
                request.id, request.topic
            ))),
        )
        .await;

        let consultants = self
            .db
            .list_accounts_by_role_and_status(AccountRole::Consultant, AccountStatus::Active)
            .await?;
        for consultant in &consultants {
            let notice = views::available_request_card(&request, Some(client));
            self.notifier
                .notify(
                    &consultant.identity,
                    OutgoingMessage {
                        text: format!("New consultation request!\n\n{}", notice.text),
                        ..notice
                    },
                )
                .await;
        }
        Ok(())
    }

    pub(super) async fn my_requests(&self, turn: &Turn<'_>) -> Outcome {
        let client = turn.require(AccountRole::Client)?;
        let requests = self.db.list_requests_by_client(client.id).await?;
        if requests.is_empty() {
            self.reply(turn, views::no_requests()).await;
            return Ok(());
        }

        self.reply(turn, OutgoingMessage::text(format!("Your requests ({}):", requests.len())))
            .await;
        for request in &requests {
            self.reply(turn, views::client_request_card(request)).await;
        }
        Ok(())
    }

    pub(super) async fn view_request(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        let account = turn.active()?;
        let request = self.load_request(id).await?;
        if !(request.is_owned_by(account.id)
            || request.is_assigned_to(account.id)
            || account.is_admin())
        {
            return Err(WorkflowError::forbidden("You do not have access to this request."));
        }

        let consultant = self.account(request.consultant_id).await?;
        self.reply(
            turn,
            menu_button(views::request_detail(&request, consultant.as_ref())),
        )
        .await;
        Ok(())
    }

    pub(super) async fn client_cancel(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        let client = turn.require(AccountRole::Client)?;
        let request = self.load_request(id).await?;
        if !request.is_owned_by(client.id) {
            return Err(not_owner("cancel it"));
        }

        self.transition(&request, RequestTransition::ClientCancel).await?;
        self.reply(
            turn,
            menu_button(OutgoingMessage::text(format!("Request #{id} has been cancelled."))),
        )
        .await;

        let consultant = self.account(request.consultant_id).await?;
        self.notifier
            .notify_account(
                consultant.as_ref(),
                OutgoingMessage::text(format!(
                    "Client {} cancelled the request \"{}\".",
                    client.full_name, request.topic
                )),
            )
            .await;
        Ok(())
    }

    pub(super) async fn accept_proposed_time(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        let client = turn.require(AccountRole::Client)?;
        let request = self.load_request(id).await?;
        if !request.is_owned_by(client.id) {
            return Err(not_owner("accept the proposed time"));
        }

        let (_, session) = self
            .schedule(&request, RequestTransition::AcceptProposedTime)
            .await?;
        self.reply(
            turn,
            menu_button(OutgoingMessage::text(format!(
                "The consultation \"{}\" is scheduled for {}.",
                session.topic, session.scheduled_at
            ))),
        )
        .await;

        let consultant = self.account(Some(session.consultant_id)).await?;
        self.notifier
            .notify_account(
                consultant.as_ref(),
                OutgoingMessage::text(format!(
                    "Client {} confirmed the consultation \"{}\" at {}.",
                    client.full_name, session.topic, session.scheduled_at
                )),
            )
            .await;
        Ok(())
    }

    pub(super) async fn begin_counter_offer(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        let client = turn.require(AccountRole::Client)?;
        let request = self.load_request(id).await?;
        if !request.is_owned_by(client.id) {
            return Err(not_owner("suggest another time"));
        }
        ensure_allowed(
            &request,
            &RequestTransition::CounterOffer {
                time: String::new(),
            },
        )?;

        self.conversations
            .set(turn.identity(), ConversationState::CounterOffer { request_id: id })
            .await;
        self.reply(
            turn,
            OutgoingMessage::text("Enter the time that suits you (e.g. 2026-03-17 09:00):"),
        )
        .await;
        Ok(())
    }

    pub(super) async fn submit_counter_offer(
        &self,
        turn: &Turn<'_>,
        id: i64,
        text: &str,
    ) -> Outcome {
        let time = text.trim();
        if time.is_empty() {
            self.reply(turn, OutgoingMessage::text("Please enter a time.")).await;
            return Ok(());
        }
        self.conversations.clear(turn.identity()).await;

        let client = turn.require(AccountRole::Client)?;
        let request = self.load_request(id).await?;
        if !request.is_owned_by(client.id) {
            return Err(not_owner("suggest another time"));
        }

        let updated = self
            .transition(
                &request,
                RequestTransition::CounterOffer {
                    time: time.to_string(),
                },
            )
            .await?;
        self.reply(
            turn,
            menu_button(OutgoingMessage::text(
                "Your suggested time has been sent to the consultant.",
            )),
        )
        .await;

        let consultant = self.account(updated.consultant_id).await?;
        self.notifier
            .notify_account(
                consultant.as_ref(),
                views::counter_offer(&updated, client, time),
            )
            .await;
        Ok(())
    }

    // ── Consultant ──────────────────────────────────────────────────

    pub(super) async fn available_requests(&self, turn: &Turn<'_>) -> Outcome {
        turn.require(AccountRole::Consultant)?;
        let open = self.db.list_requests_by_status(RequestStatus::Open).await?;
        if open.is_empty() {
            self.reply(
                turn,
                menu_button(OutgoingMessage::text("There are no open requests right now.")),
            )
            .await;
            return Ok(());
        }

        self.reply(turn, OutgoingMessage::text(format!("Open requests ({}):", open.len())))
            .await;
        for request in &open {
            let client = self.account(Some(request.client_id)).await?;
            self.reply(turn, views::available_request_card(request, client.as_ref()))
                .await;
        }
        Ok(())
    }

    pub(super) async fn take_request(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        let consultant = turn.require(AccountRole::Consultant)?;
        let request = self.load_request(id).await?;

        self.transition(
            &request,
            RequestTransition::Take {
                consultant_id: consultant.id,
            },
        )
        .await?;
        self.reply(turn, views::request_taken(id)).await;

        let client = self.account(Some(request.client_id)).await?;
        self.notifier
            .notify_account(
                client.as_ref(),
                OutgoingMessage::text(format!(
                    "Consultant {} took your request \"{}\". They will propose a time soon.",
                    consultant.full_name, request.topic
                )),
            )
            .await;
        Ok(())
    }

    pub(super) async fn my_taken_requests(&self, turn: &Turn<'_>) -> Outcome {
        let consultant = turn.require(AccountRole::Consultant)?;
        let taken = self.db.list_requests_by_consultant(consultant.id).await?;
        if taken.is_empty() {
            self.reply(
                turn,
                menu_button(OutgoingMessage::text("You have no taken requests.")),
            )
            .await;
            return Ok(());
        }

        self.reply(turn, OutgoingMessage::text(format!("Your requests ({}):", taken.len())))
            .await;
        for request in &taken {
            let client = self.account(Some(request.client_id)).await?;
            self.reply(turn, views::taken_request_card(request, client.as_ref()))
                .await;
        }
        Ok(())
    }

    pub(super) async fn begin_propose_time(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        let consultant = turn.require(AccountRole::Consultant)?;
        let request = self.load_request(id).await?;
        if !request.is_assigned_to(consultant.id) {
            return Err(not_assignee("propose a time"));
        }
        ensure_allowed(
            &request,
            &RequestTransition::ProposeTime {
                time: String::new(),
            },
        )?;

        self.conversations
            .set(turn.identity(), ConversationState::ProposeTime { request_id: id })
            .await;
        self.reply(
            turn,
            OutgoingMessage::text(
                "Enter the proposed date and time for the consultation (e.g. 2026-03-15 14:00):",
            ),
        )
        .await;
        Ok(())
    }

    pub(super) async fn submit_proposed_time(
        &self,
        turn: &Turn<'_>,
        id: i64,
        text: &str,
    ) -> Outcome {
        let time = text.trim();
        if time.is_empty() {
            self.reply(turn, OutgoingMessage::text("Please enter a time.")).await;
            return Ok(());
        }
        self.conversations.clear(turn.identity()).await;

        let consultant = turn.require(AccountRole::Consultant)?;
        let request = self.load_request(id).await?;
        if !request.is_assigned_to(consultant.id) {
            return Err(not_assignee("propose a time"));
        }

        let updated = self
            .transition(
                &request,
                RequestTransition::ProposeTime {
                    time: time.to_string(),
                },
            )
            .await?;
        self.reply(
            turn,
            menu_button(OutgoingMessage::text(
                "Your proposed time has been sent to the client.",
            )),
        )
        .await;

        let client = self.account(Some(updated.client_id)).await?;
        self.notifier
            .notify_account(client.as_ref(), views::time_proposed(&updated, consultant, time))
            .await;
        Ok(())
    }

    pub(super) async fn return_request(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        let consultant = turn.require(AccountRole::Consultant)?;
        let request = self.load_request(id).await?;
        if !request.is_assigned_to(consultant.id) {
            return Err(not_assignee("return this request"));
        }

        self.transition(&request, RequestTransition::ReturnToPool)
            .await?;
        self.reply(
            turn,
            menu_button(OutgoingMessage::text(format!(
                "Request #{id} is back in the pool."
            ))),
        )
        .await;

        let client = self.account(Some(request.client_id)).await?;
        self.notifier
            .notify_account(
                client.as_ref(),
                OutgoingMessage::text(format!(
                    "Consultant {} returned your request \"{}\" to the pool. \
                     Another consultant can take it now.",
                    consultant.full_name, request.topic
                )),
            )
            .await;
        Ok(())
    }

    pub(super) async fn accept_client_time(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        let consultant = turn.require(AccountRole::Consultant)?;
        let request = self.load_request(id).await?;
        if !request.is_assigned_to(consultant.id) {
            return Err(not_assignee("accept the client's time"));
        }
        let has_time = request
            .preferred_time
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !has_time {
            return Err(WorkflowError::precondition(
                "The client has not suggested a time. Propose one instead.",
            ));
        }

        let (_, session) = self
            .schedule(&request, RequestTransition::AcceptClientTime)
            .await?;
        self.reply(
            turn,
            menu_button(OutgoingMessage::text(format!(
                "The consultation \"{}\" is scheduled for {}.",
                session.topic, session.scheduled_at
            ))),
        )
        .await;

        let client = self.account(Some(session.client_id)).await?;
        self.notifier
            .notify_account(
                client.as_ref(),
                OutgoingMessage::text(format!(
                    "Consultant {} confirmed the consultation \"{}\" at {}.",
                    consultant.full_name, session.topic, session.scheduled_at
                )),
            )
            .await;
        Ok(())
    }

    // ── Admin ───────────────────────────────────────────────────────

    /// Cancel any live request on the admin's behalf.
    pub(super) async fn admin_cancel_request(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        turn.require_admin()?;
        let request = self.load_request(id).await?;

        self.transition(&request, RequestTransition::AdminCancel)
            .await?;
        if request.status == RequestStatus::Scheduled {
            self.cancel_request_session(request.id, request.client_id)
                .await?;
        }
        self.reply(
            turn,
            OutgoingMessage::text(format!("Request #{id} has been cancelled.")),
        )
        .await;

        let notice = OutgoingMessage::text(format!(
            "The request \"{}\" was cancelled by the administrator.",
            request.topic
        ));
        let client = self.account(Some(request.client_id)).await?;
        let consultant = self.account(request.consultant_id).await?;
        self.notifier
            .notify_account(client.as_ref(), notice.clone())
            .await;
        self.notifier
            .notify_account(consultant.as_ref(), notice)
            .await;
        Ok(())
    }

    /// A scheduled request carries a live session; cancel it with the request.
    async fn cancel_request_session(&self, request_id: i64, client_id: i64) -> Outcome {
        let sessions = self.db.list_sessions_by_client(client_id).await?;
        let Some(session) = sessions.iter().find(|s| s.request_id == request_id) else {
            return Ok(());
        };
        if let Some(cancelled) = self
            .db
            .update_session_status_if(session.id, SessionStatus::Scheduled, SessionStatus::Cancelled)
            .await?
        {
            tracing::info!(
                request_id,
                session_id = cancelled.id,
                "Session cancelled with its request"
            );
        }
        Ok(())
    }
}
