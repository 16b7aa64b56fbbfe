//! Registration wizard for clients and consultants.

use crate::channels::{InboundEvent, OutgoingMessage};
use crate::conversation::{ConversationState, RegistrationStep, optional_answer};
use crate::domain::{AccountRole, NewAccount};
use crate::error::{DatabaseError, WorkflowError};

use super::engine::{Engine, Outcome, Turn};
use super::views;

/// What a reply to the current step leads to.
#[derive(Debug, PartialEq)]
enum Progress {
    Next(RegistrationStep),
    /// A required answer was blank; ask the same question again.
    Retry(RegistrationStep),
    Complete(NewAccount),
}

fn required(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Fill one field and move to the following step.
fn advance(step: RegistrationStep, text: &str, event: &InboundEvent) -> Progress {
    use RegistrationStep::*;
    match step {
        ClientName => match required(text) {
            Some(full_name) => Progress::Next(ClientDescription { full_name }),
            None => Progress::Retry(ClientName),
        },
        ClientDescription { full_name } => Progress::Next(ClientContact {
            full_name,
            description: optional_answer(text),
        }),
        ClientContact {
            full_name,
            description,
        } => Progress::Complete(NewAccount::client(
            event.identity.clone(),
            event.username.clone(),
            full_name,
            description,
            optional_answer(text),
        )),
        ConsultantName => match required(text) {
            Some(full_name) => Progress::Next(ConsultantCompetencies { full_name }),
            None => Progress::Retry(ConsultantName),
        },
        ConsultantCompetencies { full_name } => match required(text) {
            Some(competencies) => Progress::Next(ConsultantExperience {
                full_name,
                competencies,
            }),
            None => Progress::Retry(ConsultantCompetencies { full_name }),
        },
        ConsultantExperience {
            full_name,
            competencies,
        } => Progress::Next(ConsultantTimezone {
            full_name,
            competencies,
            experience: optional_answer(text),
        }),
        ConsultantTimezone {
            full_name,
            competencies,
            experience,
        } => match required(text) {
            Some(timezone) => Progress::Complete(NewAccount::consultant(
                event.identity.clone(),
                event.username.clone(),
                full_name,
                competencies,
                experience,
                timezone,
            )),
            None => Progress::Retry(ConsultantTimezone {
                full_name,
                competencies,
                experience,
            }),
        },
    }
}

impl Engine {
    pub(super) async fn begin_registration(&self, turn: &Turn<'_>, role: AccountRole) -> Outcome {
        if turn.account.is_some() {
            return Err(WorkflowError::precondition("You are already registered."));
        }
        if !self.db.get_settings().await?.registration_enabled {
            return Err(WorkflowError::precondition(
                "Registration is currently closed. Please try again later.",
            ));
        }

        let step = match role {
            AccountRole::Consultant => RegistrationStep::ConsultantName,
            _ => RegistrationStep::ClientName,
        };
        let intro = match role {
            AccountRole::Consultant => "Registering as a consultant.",
            _ => "Registering as a client.",
        };
        self.reply(
            turn,
            OutgoingMessage::text(format!("{intro}\n\n{}", step.prompt())),
        )
        .await;
        self.conversations
            .set(turn.identity(), ConversationState::Registration(step))
            .await;
        Ok(())
    }

    pub(super) async fn registration_step(
        &self,
        turn: &Turn<'_>,
        step: RegistrationStep,
        text: &str,
    ) -> Outcome {
        match advance(step, text, turn.event) {
            Progress::Next(next) => {
                self.reply(turn, OutgoingMessage::text(next.prompt())).await;
                self.conversations
                    .set(turn.identity(), ConversationState::Registration(next))
                    .await;
                Ok(())
            }
            Progress::Retry(same) => {
                self.reply(
                    turn,
                    OutgoingMessage::text(format!("This answer is required. {}", same.prompt())),
                )
                .await;
                Ok(())
            }
            Progress::Complete(new) => self.complete_registration(turn, new).await,
        }
    }

    async fn complete_registration(&self, turn: &Turn<'_>, new: NewAccount) -> Outcome {
        self.conversations.clear(turn.identity()).await;

        // The admin may have closed registration while the wizard was open.
        if !self.db.get_settings().await?.registration_enabled {
            return Err(WorkflowError::precondition(
                "Registration is currently closed. Please try again later.",
            ));
        }

        let account = match self.db.create_account(&new).await {
            Ok(a) => a,
            Err(DatabaseError::Constraint(_)) => {
                return Err(WorkflowError::precondition("You are already registered."));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(account_id = account.id, role = %account.role, "Registration submitted");

        self.reply(
            turn,
            OutgoingMessage::text(
                "Thank you! Your registration has been submitted and is waiting for \
                 administrator approval. You will get a message once it is reviewed.",
            ),
        )
        .await;

        let heading = match account.role {
            AccountRole::Consultant => "New consultant registration:",
            _ => "New client registration:",
        };
        let admin = self.db.get_admin().await?;
        self.notifier
            .notify_account(admin.as_ref(), views::pending_account_card(&account, heading))
            .await;
        Ok(())
    }
}
