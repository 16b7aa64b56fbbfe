//! Session listings and the two-party confirmation protocol.

use crate::channels::OutgoingMessage;
use crate::domain::{Account, AccountRole, Party, SessionStatus};
use crate::error::WorkflowError;

use super::action::Action;
use super::engine::{Engine, Outcome, Turn};
use super::views;

impl Engine {
    pub(super) async fn my_sessions(&self, turn: &Turn<'_>, party: Party) -> Outcome {
        let role = match party {
            Party::Client => AccountRole::Client,
            Party::Consultant => AccountRole::Consultant,
        };
        let account = turn.require(role)?;
        let sessions = match party {
            Party::Client => self.db.list_sessions_by_client(account.id).await?,
            Party::Consultant => self.db.list_sessions_by_consultant(account.id).await?,
        };

        if sessions.is_empty() {
            self.reply(
                turn,
                OutgoingMessage::text("You have no consultations yet.")
                    .button("Menu", Action::BackToMenu.encode()),
            )
            .await;
            return Ok(());
        }

        self.reply(
            turn,
            OutgoingMessage::text(format!("Your consultations ({}):", sessions.len())),
        )
        .await;
        for session in &sessions {
            let counterpart = self
                .account(Some(session.account_of(party.other())))
                .await?;
            self.reply(turn, views::session_card(session, party, counterpart.as_ref()))
                .await;
        }
        Ok(())
    }

    /// Record whether the session took place and resolve it once both
    /// participants have answered.
    pub(super) async fn confirm_session(
        &self,
        turn: &Turn<'_>,
        id: i64,
        happened: bool,
    ) -> Outcome {
        let account = turn.active()?;
        let session = self.load_session(id).await?;
        let party = session.party_of(account.id).ok_or_else(|| {
            WorkflowError::forbidden("You are not a participant of this consultation.")
        })?;
        if session.status != SessionStatus::Scheduled {
            return Err(WorkflowError::precondition(
                "This consultation has already been resolved.",
            ));
        }

        let updated = self
            .db
            .set_session_confirmation(id, party, happened)
            .await?
            .ok_or_else(|| {
                WorkflowError::precondition("This consultation has already been resolved.")
            })?;
        tracing::info!(session_id = id, ?party, happened, "Session confirmation recorded");

        let resolution = updated.resolution();
        if resolution == SessionStatus::Scheduled {
            self.reply(
                turn,
                OutgoingMessage::text(
                    "Thank you, your answer has been recorded. \
                     Waiting for the other participant.",
                ),
            )
            .await;
            return Ok(());
        }

        let resolved = self
            .db
            .update_session_status_if(id, SessionStatus::Scheduled, resolution)
            .await?;
        let Some(resolved) = resolved else {
            // A concurrent answer already resolved it.
            self.reply(
                turn,
                OutgoingMessage::text("Thank you, your answer has been recorded."),
            )
            .await;
            return Ok(());
        };
        tracing::info!(session_id = id, status = %resolved.status, "Session resolved");

        let text = match resolved.status {
            SessionStatus::Completed => {
                "Thank you! Both participants confirmed that the consultation took place."
            }
            SessionStatus::NotHappened => {
                "Thank you. Both participants reported that the consultation did not take place."
            }
            _ => "Thank you. Your answers differ, so the administrator has been notified.",
        };
        self.reply(turn, OutgoingMessage::text(text)).await;

        if resolved.status == SessionStatus::Disagreement {
            let client = self.account(Some(resolved.client_id)).await?;
            let consultant = self.account(Some(resolved.consultant_id)).await?;
            let admin = self.db.get_admin().await?;
            self.notifier
                .notify_account(
                    admin.as_ref(),
                    views::disagreement_notice(&resolved, client.as_ref(), consultant.as_ref()),
                )
                .await;
        }
        Ok(())
    }

    /// Push the yes/no prompt to both participants of a scheduled session.
    pub(super) async fn ask_confirmation(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        turn.require_admin()?;
        let session = self.load_session(id).await?;
        if session.status != SessionStatus::Scheduled {
            return Err(WorkflowError::precondition(
                "This consultation is no longer scheduled.",
            ));
        }

        let client = self.account(Some(session.client_id)).await?;
        let consultant = self.account(Some(session.consultant_id)).await?;
        let name = |a: Option<&Account>| {
            a.map(|a| a.full_name.clone()).unwrap_or_else(|| "?".into())
        };

        self.notifier
            .notify_account(
                client.as_ref(),
                views::confirmation_prompt(&session, &name(consultant.as_ref())),
            )
            .await;
        self.notifier
            .notify_account(
                consultant.as_ref(),
                views::confirmation_prompt(&session, &name(client.as_ref())),
            )
            .await;

        tracing::info!(session_id = id, "Confirmation requested from participants");
        self.reply(
            turn,
            OutgoingMessage::text("Confirmation request sent to both participants."),
        )
        .await;
        Ok(())
    }

    /// Cancel a scheduled session on the admin's behalf.
    pub(super) async fn admin_cancel_session(&self, turn: &Turn<'_>, id: i64) -> Outcome {
        turn.require_admin()?;
        let session = self.load_session(id).await?;

        let cancelled = self
            .db
            .update_session_status_if(id, SessionStatus::Scheduled, SessionStatus::Cancelled)
            .await?
            .ok_or_else(|| {
                WorkflowError::precondition("This consultation is no longer scheduled.")
            })?;
        tracing::info!(session_id = cancelled.id, "Session cancelled by admin");

        self.reply(
            turn,
            OutgoingMessage::text(format!("Consultation #{id} has been cancelled.")),
        )
        .await;

        let notice = OutgoingMessage::text(format!(
            "The consultation \"{}\" ({}) was cancelled by the administrator.",
            session.topic, session.scheduled_at
        ));
        let client = self.account(Some(session.client_id)).await?;
        let consultant = self.account(Some(session.consultant_id)).await?;
        self.notifier
            .notify_account(client.as_ref(), notice.clone())
            .await;
        self.notifier
            .notify_account(consultant.as_ref(), notice)
            .await;
        Ok(())
    }
}
