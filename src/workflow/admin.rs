//! Admin panel: moderation, oversight, settings, reset, and the one-time
//! admin claim.

use crate::channels::OutgoingMessage;
use crate::conversation::ConversationState;
use crate::domain::{
    AccountPatch, AccountRole, AccountStatus, NewAccount, RequestStatus, SettingsPatch,
};
use crate::error::WorkflowError;

use super::action::AdminAction;
use super::engine::{Engine, Outcome, Turn};
use super::views;

const ADMIN_TAKEN: &str = "An administrator is already assigned.";

fn role_plural(role: AccountRole) -> &'static str {
    match role {
        AccountRole::Consultant => "consultants",
        _ => "clients",
    }
}

impl Engine {
    pub(super) async fn admin_panel(&self, turn: &Turn<'_>) -> Outcome {
        turn.require_admin()?;
        self.reply(turn, views::admin_panel()).await;
        Ok(())
    }

    pub(super) async fn admin_action(&self, turn: &Turn<'_>, action: AdminAction) -> Outcome {
        turn.require_admin()?;
        match action {
            AdminAction::Panel => {
                self.reply(turn, views::admin_panel()).await;
                Ok(())
            }
            AdminAction::Pending => self.pending_overview(turn).await,
            AdminAction::PendingList(role) => self.pending_list(turn, role).await,
            AdminAction::Approve(id) => self.moderate(turn, id, AccountStatus::Active).await,
            AdminAction::Reject(id) => self.moderate(turn, id, AccountStatus::Rejected).await,
            AdminAction::Accounts(role) => self.account_list(turn, role).await,
            AdminAction::Block(id) => self.set_account_status(turn, id, AccountStatus::Blocked).await,
            AdminAction::Unblock(id) => {
                self.set_account_status(turn, id, AccountStatus::Active).await
            }
            AdminAction::ChangeRole { role, account_id } => {
                self.change_role(turn, account_id, role).await
            }
            AdminAction::Requests => self.requests_overview(turn).await,
            AdminAction::RequestsByStatus(status) => self.requests_by_status(turn, status).await,
            AdminAction::CancelRequest(id) => self.admin_cancel_request(turn, id).await,
            AdminAction::Sessions => self.sessions_overview(turn).await,
            AdminAction::CancelSession(id) => self.admin_cancel_session(turn, id).await,
            AdminAction::Settings => {
                let settings = self.db.get_settings().await?;
                self.reply(turn, views::settings(&settings)).await;
                Ok(())
            }
            AdminAction::ToggleRegistration => {
                let current = self.db.get_settings().await?;
                self.apply_settings(
                    turn,
                    SettingsPatch {
                        registration_enabled: Some(!current.registration_enabled),
                        ..Default::default()
                    },
                )
                .await
            }
            AdminAction::ToggleConsultations => {
                let current = self.db.get_settings().await?;
                self.apply_settings(
                    turn,
                    SettingsPatch {
                        consultations_enabled: Some(!current.consultations_enabled),
                        ..Default::default()
                    },
                )
                .await
            }
            AdminAction::Reset => {
                self.conversations
                    .set(turn.identity(), ConversationState::ConfirmReset)
                    .await;
                self.reply(turn, views::reset_warning()).await;
                Ok(())
            }
            AdminAction::ResetConfirm => self.reset(turn).await,
            AdminAction::ResetCancel => {
                self.conversations.clear(turn.identity()).await;
                self.reply(turn, OutgoingMessage::text("Reset cancelled.")).await;
                self.reply(turn, views::admin_panel()).await;
                Ok(())
            }
        }
    }

    // ── Registrations ───────────────────────────────────────────────

    async fn pending_overview(&self, turn: &Turn<'_>) -> Outcome {
        let clients = self
            .db
            .list_accounts_by_role_and_status(AccountRole::Client, AccountStatus::Pending)
            .await?;
        let consultants = self
            .db
            .list_accounts_by_role_and_status(AccountRole::Consultant, AccountStatus::Pending)
            .await?;
        self.reply(turn, views::pending_overview(clients.len(), consultants.len()))
            .await;
        Ok(())
    }

    async fn pending_list(&self, turn: &Turn<'_>, role: AccountRole) -> Outcome {
        let pending = self
            .db
            .list_accounts_by_role_and_status(role, AccountStatus::Pending)
            .await?;
        if pending.is_empty() {
            self.reply(
                turn,
                views::empty_list(
                    &format!("No pending {}.", role_plural(role)),
                    AdminAction::Pending,
                ),
            )
            .await;
            return Ok(());
        }

        let heading = format!("Pending {role}:");
        for account in &pending {
            self.reply(turn, views::pending_account_card(account, &heading))
                .await;
        }
        Ok(())
    }

    /// Approve or reject a pending registration.
    async fn moderate(&self, turn: &Turn<'_>, id: i64, target: AccountStatus) -> Outcome {
        let account = self.load_account(id).await?;
        if account.status != AccountStatus::Pending {
            return Err(WorkflowError::precondition(format!(
                "{} has already been processed (status: {}).",
                account.full_name, account.status
            )));
        }

        let updated = self
            .db
            .update_account(id, &AccountPatch::status(target))
            .await?
            .ok_or_else(|| WorkflowError::not_found("User not found."))?;
        tracing::info!(account_id = id, status = %updated.status, "Registration moderated");

        let (reply, notice) = match (target, updated.role) {
            (AccountStatus::Active, AccountRole::Consultant) => (
                format!("{} has been approved as a consultant.", updated.full_name),
                "Your registration as a consultant has been approved! \
                 Use /menu to see available requests.",
            ),
            (AccountStatus::Active, _) => (
                format!("{} has been approved as a client.", updated.full_name),
                "Your registration as a client has been approved! \
                 Use /menu to request a consultation.",
            ),
            _ => (
                format!("{}'s registration has been rejected.", updated.full_name),
                "Unfortunately, your registration was rejected by the administrator.",
            ),
        };
        self.reply(turn, OutgoingMessage::text(reply)).await;
        self.notifier
            .notify(&updated.identity, OutgoingMessage::text(notice))
            .await;
        Ok(())
    }

    // ── Accounts ────────────────────────────────────────────────────

    async fn account_list(&self, turn: &Turn<'_>, role: AccountRole) -> Outcome {
        let accounts = self.db.list_accounts_by_role(role).await?;
        if accounts.is_empty() {
            self.reply(
                turn,
                views::empty_list(
                    &format!("No {} yet.", role_plural(role)),
                    AdminAction::Panel,
                ),
            )
            .await;
            return Ok(());
        }
        self.reply(turn, views::account_list(role, &accounts)).await;
        Ok(())
    }

    /// Block or unblock an account.
    async fn set_account_status(
        &self,
        turn: &Turn<'_>,
        id: i64,
        target: AccountStatus,
    ) -> Outcome {
        let account = self.load_account(id).await?;
        if account.is_admin() {
            return Err(WorkflowError::precondition(
                "The administrator account cannot be blocked.",
            ));
        }
        // Approval goes through moderation, not unblock.
        if account.status == AccountStatus::Pending || !account.status.can_transition_to(target) {
            return Err(WorkflowError::precondition(format!(
                "{} is {}; that change is not possible.",
                account.full_name, account.status
            )));
        }

        let updated = self
            .db
            .update_account(id, &AccountPatch::status(target))
            .await?
            .ok_or_else(|| WorkflowError::not_found("User not found."))?;
        tracing::info!(account_id = id, status = %updated.status, "Account status changed");

        let (reply, notice) = if target == AccountStatus::Blocked {
            (
                format!("{} has been blocked.", updated.full_name),
                "Your account has been blocked by the administrator.",
            )
        } else {
            (
                format!("{} has been unblocked.", updated.full_name),
                "Your account has been unblocked. Use /menu to continue.",
            )
        };
        self.reply(turn, OutgoingMessage::text(reply)).await;
        self.notifier
            .notify(&updated.identity, OutgoingMessage::text(notice))
            .await;
        Ok(())
    }

    async fn change_role(&self, turn: &Turn<'_>, id: i64, role: AccountRole) -> Outcome {
        if !matches!(role, AccountRole::Client | AccountRole::Consultant) {
            return Err(WorkflowError::precondition(
                "Only the client and consultant roles can be assigned.",
            ));
        }
        let account = self.load_account(id).await?;
        if account.is_admin() {
            return Err(WorkflowError::precondition(
                "The administrator's role cannot be changed.",
            ));
        }
        if account.role == role {
            return Err(WorkflowError::precondition(format!(
                "{} is already a {role}.",
                account.full_name
            )));
        }

        let updated = self
            .db
            .update_account(id, &AccountPatch::role(role))
            .await?
            .ok_or_else(|| WorkflowError::not_found("User not found."))?;
        tracing::info!(account_id = id, from = %account.role, to = %updated.role, "Role changed");

        self.reply(
            turn,
            OutgoingMessage::text(format!("{} is now a {role}.", updated.full_name)),
        )
        .await;
        self.notifier
            .notify(
                &updated.identity,
                OutgoingMessage::text(format!(
                    "The administrator changed your role to {role}. Use /menu to see your new menu."
                )),
            )
            .await;
        Ok(())
    }

    // ── Requests and sessions ───────────────────────────────────────

    async fn requests_overview(&self, turn: &Turn<'_>) -> Outcome {
        let requests = self.db.list_requests().await?;
        let counts: Vec<(RequestStatus, usize)> = RequestStatus::ALL
            .iter()
            .map(|s| (*s, requests.iter().filter(|r| r.status == *s).count()))
            .collect();
        self.reply(turn, views::requests_overview(&counts)).await;
        Ok(())
    }

    async fn requests_by_status(&self, turn: &Turn<'_>, status: RequestStatus) -> Outcome {
        let requests = self.db.list_requests_by_status(status).await?;
        if requests.is_empty() {
            self.reply(
                turn,
                views::empty_list(
                    &format!("No requests with status \"{}\".", status.label()),
                    AdminAction::Requests,
                ),
            )
            .await;
            return Ok(());
        }

        for request in &requests {
            let client = self.account(Some(request.client_id)).await?;
            let consultant = self.account(request.consultant_id).await?;
            self.reply(
                turn,
                views::admin_request_card(request, client.as_ref(), consultant.as_ref()),
            )
            .await;
        }
        Ok(())
    }

    async fn sessions_overview(&self, turn: &Turn<'_>) -> Outcome {
        let sessions = self.db.list_sessions().await?;
        if sessions.is_empty() {
            self.reply(
                turn,
                views::empty_list("No consultations yet.", AdminAction::Panel),
            )
            .await;
            return Ok(());
        }

        for session in &sessions {
            let client = self.account(Some(session.client_id)).await?;
            let consultant = self.account(Some(session.consultant_id)).await?;
            self.reply(
                turn,
                views::admin_session_card(session, client.as_ref(), consultant.as_ref()),
            )
            .await;
        }
        Ok(())
    }

    // ── Settings and reset ──────────────────────────────────────────

    async fn apply_settings(&self, turn: &Turn<'_>, patch: SettingsPatch) -> Outcome {
        let settings = self.db.update_settings(patch).await?;
        tracing::info!(
            registration_enabled = settings.registration_enabled,
            consultations_enabled = settings.consultations_enabled,
            "Settings updated"
        );
        self.reply(turn, views::settings(&settings)).await;
        Ok(())
    }

    async fn reset(&self, turn: &Turn<'_>) -> Outcome {
        if self.conversations.get(turn.identity()).await != Some(ConversationState::ConfirmReset) {
            return Err(WorkflowError::precondition(
                "Start the reset from the admin panel first.",
            ));
        }

        self.db.reset_all().await?;
        self.conversations.clear_all().await;
        tracing::warn!(identity = %turn.identity(), "All data reset by the administrator");

        self.reply(
            turn,
            OutgoingMessage::text(
                "The bot has been reset and all data deleted. \
                 Send the admin phrase to become administrator again.",
            ),
        )
        .await;
        Ok(())
    }

    // ── Claim ───────────────────────────────────────────────────────

    /// Make the sender the administrator if there is none yet.
    pub(super) async fn claim_admin(&self, turn: &Turn<'_>) -> Outcome {
        if let Some(admin) = self.db.get_admin().await? {
            if &admin.identity == turn.identity() {
                return Err(WorkflowError::precondition("You are already the administrator."));
            }
            return Err(WorkflowError::precondition(ADMIN_TAKEN));
        }

        let admin = match &turn.account {
            Some(existing) => self.db.claim_admin(existing.id).await?,
            None => {
                let event = turn.event;
                let full_name = event
                    .display_name
                    .clone()
                    .or_else(|| event.username.clone())
                    .unwrap_or_else(|| "Administrator".to_string());
                let new = NewAccount::admin(event.identity.clone(), event.username.clone(), full_name);
                self.db.create_admin(&new).await?
            }
        };
        let admin = admin.ok_or_else(|| WorkflowError::precondition(ADMIN_TAKEN))?;
        tracing::info!(account_id = admin.id, "Administrator claimed");

        self.conversations.clear(turn.identity()).await;
        self.reply(
            turn,
            OutgoingMessage::text(format!(
                "{}, you are now the administrator. Use /admin to open the admin panel.",
                admin.full_name
            )),
        )
        .await;
        Ok(())
    }
}
