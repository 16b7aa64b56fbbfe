//! End-to-end chat scenarios driven through the engine.
//!
//! Each test wires an `Engine` to an in-memory database and a recording
//! channel, feeds it events as a chat user would, and checks both the
//! replies and the repository state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use consult_desk::channels::{Channel, EventKind, EventStream, InboundEvent, OutgoingMessage};
use consult_desk::conversation::InMemoryConversationStore;
use consult_desk::domain::{
    Account, AccountPatch, AccountRole, AccountStatus, ConsultationRequest, ConsultationSession,
    Identity, NewAccount, NewRequest, NewSession, Party, RequestPatch, RequestStatus,
    SessionStatus, Settings, SettingsPatch,
};
use consult_desk::error::{ChannelError, DatabaseError};
use consult_desk::store::{Database, LibSqlBackend};
use consult_desk::workflow::Engine;

const PHRASE: &str = "let me in";

/// Channel double that records every outgoing message.
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(Identity, OutgoingMessage)>>,
}

#[async_trait]
impl Channel for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send(&self, to: &Identity, message: OutgoingMessage) -> Result<(), ChannelError> {
        self.sent.lock().await.push((to.clone(), message));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Messages delivered during one step.
struct Sent(Vec<(Identity, OutgoingMessage)>);

impl Sent {
    fn to(&self, who: &str) -> Vec<&OutgoingMessage> {
        self.0
            .iter()
            .filter(|(id, _)| id.as_str() == who)
            .map(|(_, m)| m)
            .collect()
    }

    fn text_to(&self, who: &str) -> String {
        self.to(who)
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn buttons_to(&self, who: &str) -> Vec<String> {
        self.to(who)
            .iter()
            .flat_map(|m| m.button_data().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }
}

struct Desk {
    engine: Engine,
    recorder: Arc<Recorder>,
    db: Arc<dyn Database>,
    conversations: Arc<InMemoryConversationStore>,
}

impl Desk {
    async fn new() -> Self {
        Self::over(Arc::new(LibSqlBackend::new_memory().await.unwrap()))
    }

    fn over(db: Arc<dyn Database>) -> Self {
        let recorder = Arc::new(Recorder::default());
        let conversations = Arc::new(InMemoryConversationStore::new());
        let engine = Engine::new(db.clone(), conversations.clone(), recorder.clone(), PHRASE);
        Self {
            engine,
            recorder,
            db,
            conversations,
        }
    }

    async fn send(&self, event: InboundEvent) -> Sent {
        self.engine.handle(&event).await;
        Sent(std::mem::take(&mut *self.recorder.sent.lock().await))
    }

    async fn text(&self, who: &str, text: &str) -> Sent {
        self.send(InboundEvent::new(who, EventKind::Text(text.into())))
            .await
    }

    async fn command(&self, who: &str, command: &str) -> Sent {
        self.send(InboundEvent::new(who, EventKind::Command(command.into())))
            .await
    }

    async fn press(&self, who: &str, data: &str) -> Sent {
        self.send(InboundEvent::new(
            who,
            EventKind::Callback {
                data: data.into(),
                callback_id: None,
            },
        ))
        .await
    }

    async fn account(&self, who: &str) -> Account {
        self.db
            .get_account_by_identity(&Identity::new(who))
            .await
            .unwrap()
            .unwrap()
    }

    /// Create an already-approved account directly in the repository.
    async fn active(&self, who: &str, name: &str, role: AccountRole) -> Account {
        let new = match role {
            AccountRole::Consultant => NewAccount::consultant(
                Identity::new(who),
                None,
                name.into(),
                "general".into(),
                None,
                "UTC".into(),
            ),
            _ => NewAccount::client(Identity::new(who), None, name.into(), None, None),
        };
        let account = self.db.create_account(&new).await.unwrap();
        self.db
            .update_account(account.id, &AccountPatch::status(AccountStatus::Active))
            .await
            .unwrap()
            .unwrap()
    }

    /// Take `rid` as `consultant` and accept the client's time.
    async fn scheduled(&self, consultant: &str, rid: i64) -> i64 {
        self.press(consultant, &format!("take_request_{rid}")).await;
        self.press(consultant, &format!("accept_client_time_{rid}"))
            .await;
        let sessions = self.db.list_sessions().await.unwrap();
        sessions
            .iter()
            .find(|s| s.request_id == rid)
            .map(|s| s.id)
            .unwrap()
    }

    async fn open_request(&self, client: &Account, preferred_time: Option<&str>) -> i64 {
        self.db
            .create_request(&NewRequest {
                client_id: client.id,
                topic: "Tax planning".into(),
                preferred_time: preferred_time.map(str::to_string),
                details: None,
            })
            .await
            .unwrap()
            .id
    }
}

#[tokio::test]
async fn tax_planning_ends_in_disagreement() {
    let desk = Desk::new().await;

    // Admin claims the desk.
    let sent = desk
        .send(InboundEvent::new("9", EventKind::Text(PHRASE.into())).with_display_name("Dana"))
        .await;
    assert!(sent.text_to("9").contains("administrator"));

    // Client A registers.
    desk.command("1", "start").await;
    desk.press("1", "register_client").await;
    desk.text("1", "Alice").await;
    desk.text("1", "-").await;
    let sent = desk.text("1", "alice@example.com").await;
    assert!(sent.text_to("1").contains("waiting for administrator approval"));
    let alice = desk.account("1").await;
    assert_eq!(alice.status, AccountStatus::Pending);
    assert!(
        sent.buttons_to("9")
            .contains(&format!("approve_user_{}", alice.id))
    );

    // Consultant B registers.
    desk.press("2", "register_consultant").await;
    desk.text("2", "Bob").await;
    desk.text("2", "tax law").await;
    desk.text("2", "10 years").await;
    desk.text("2", "UTC+3").await;
    let bob = desk.account("2").await;
    assert_eq!(bob.role, AccountRole::Consultant);
    assert_eq!(bob.competencies.as_deref(), Some("tax law"));

    // Admin approves both.
    let sent = desk.press("9", &format!("approve_user_{}", alice.id)).await;
    assert!(sent.text_to("1").contains("approved"));
    desk.press("9", &format!("approve_user_{}", bob.id)).await;
    assert!(desk.account("2").await.is_active());

    // Alice creates a request; Bob hears about it.
    desk.press("1", "create_request").await;
    desk.text("1", "Tax planning").await;
    desk.text("1", "2026-03-15 14:00").await;
    let sent = desk.text("1", "-").await;
    let requests = desk.db.list_requests_by_client(alice.id).await.unwrap();
    assert_eq!(requests.len(), 1);
    let rid = requests[0].id;
    assert_eq!(requests[0].status, RequestStatus::Open);
    assert!(sent.buttons_to("2").contains(&format!("take_request_{rid}")));

    // Bob takes it.
    let sent = desk.press("2", &format!("take_request_{rid}")).await;
    assert!(sent.text_to("1").contains("Bob took your request"));
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Taken);
    assert_eq!(req.consultant_id, Some(bob.id));

    // Bob proposes a time.
    desk.press("2", &format!("propose_time_{rid}")).await;
    let sent = desk.text("2", "2026-03-16 10:00").await;
    assert_eq!(
        sent.buttons_to("1"),
        vec![format!("accept_time_{rid}"), format!("reject_time_{rid}")]
    );
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::TimeProposed);

    // Alice counters.
    desk.press("1", &format!("reject_time_{rid}")).await;
    let sent = desk.text("1", "2026-03-17 09:00").await;
    assert!(
        sent.buttons_to("2")
            .contains(&format!("accept_client_time_{rid}"))
    );
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Taken);
    assert_eq!(req.preferred_time.as_deref(), Some("2026-03-17 09:00"));
    assert_eq!(req.consultant_id, Some(bob.id));

    // Bob accepts the client's time.
    let sent = desk.press("2", &format!("accept_client_time_{rid}")).await;
    assert!(sent.text_to("1").contains("2026-03-17 09:00"));
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Scheduled);
    let sessions = desk.db.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.request_id, rid);
    assert_eq!(session.client_id, alice.id);
    assert_eq!(session.consultant_id, bob.id);
    assert_eq!(session.scheduled_at, "2026-03-17 09:00");
    assert_eq!(session.topic, "Tax planning");
    let sid = session.id;

    // Alice says yes; Bob is not told.
    let sent = desk.press("1", &format!("confirm_session_yes_{sid}")).await;
    assert!(sent.to("2").is_empty());
    assert!(sent.text_to("1").contains("Waiting for the other participant"));
    let s = desk.db.get_session(sid).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Scheduled);
    assert_eq!(s.client_confirmed, Some(true));

    // Repeating the same answer changes nothing.
    desk.press("1", &format!("confirm_session_yes_{sid}")).await;
    let s = desk.db.get_session(sid).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Scheduled);

    // Bob says no: disagreement, admin notified.
    let sent = desk.press("2", &format!("confirm_session_no_{sid}")).await;
    let s = desk.db.get_session(sid).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Disagreement);
    assert_eq!(s.consultant_confirmed, Some(false));
    assert!(sent.text_to("9").contains("disagree"));

    // No re-confirmation once resolved.
    let sent = desk.press("1", &format!("confirm_session_no_{sid}")).await;
    assert!(sent.text_to("1").contains("already been resolved"));
    let s = desk.db.get_session(sid).await.unwrap().unwrap();
    assert_eq!(s.client_confirmed, Some(true));
}

#[tokio::test]
async fn both_confirmations_true_complete_the_session() {
    let desk = Desk::new().await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;
    let rid = desk.open_request(&alice, Some("Friday 10:00")).await;

    desk.press("2", &format!("take_request_{rid}")).await;
    desk.press("2", &format!("propose_time_{rid}")).await;
    desk.text("2", "Friday 11:00").await;
    desk.press("1", &format!("accept_time_{rid}")).await;

    let session = desk.db.list_sessions().await.unwrap().remove(0);
    assert_eq!(session.scheduled_at, "Friday 11:00");

    desk.press("2", &format!("confirm_session_yes_{}", session.id))
        .await;
    desk.press("1", &format!("confirm_session_yes_{}", session.id))
        .await;
    let s = desk.db.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Completed);
}

#[tokio::test]
async fn registration_disabled_creates_no_account() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    let sent = desk.press("9", "toggle_registration").await;
    assert!(sent.text_to("9").contains("User registration: disabled"));

    let sent = desk.command("1", "start").await;
    assert!(sent.text_to("1").contains("closed"));

    let sent = desk.press("1", "register_client").await;
    assert!(sent.text_to("1").contains("closed"));
    assert!(
        desk.db
            .get_account_by_identity(&Identity::new("1"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn registration_closed_mid_flow_is_refused_at_the_end() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;

    desk.press("1", "register_client").await;
    desk.text("1", "Alice").await;
    desk.text("1", "-").await;
    desk.press("9", "toggle_registration").await;
    let sent = desk.text("1", "-").await;

    assert!(sent.text_to("1").contains("closed"));
    assert_eq!(desk.db.list_accounts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn only_one_admin_can_claim() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    let sent = desk.text("5", PHRASE).await;
    assert!(sent.text_to("5").contains("already assigned"));

    let admin = desk.db.get_admin().await.unwrap().unwrap();
    assert_eq!(admin.identity, Identity::new("9"));
    assert!(
        desk.db
            .get_account_by_identity(&Identity::new("5"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn registered_user_is_promoted_by_claim() {
    let desk = Desk::new().await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.text("1", PHRASE).await;

    let admin = desk.db.get_admin().await.unwrap().unwrap();
    assert_eq!(admin.id, alice.id);
    assert_eq!(admin.role, AccountRole::Admin);
}

#[tokio::test]
async fn reset_requires_confirmation_and_allows_new_claim() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;
    let rid = desk.open_request(&alice, Some("Monday")).await;
    desk.scheduled("2", rid).await;
    desk.press("9", "toggle_consultations").await;
    assert!(!desk.db.get_settings().await.unwrap().consultations_enabled);

    // Someone mid-registration.
    desk.press("3", "register_consultant").await;
    assert_eq!(desk.conversations.len().await, 1);

    // Confirm without the warning first: refused.
    let sent = desk.press("9", "admin_reset_confirm").await;
    assert!(sent.text_to("9").contains("admin panel first"));
    assert_eq!(desk.db.list_accounts().await.unwrap().len(), 3);

    // Warning then cancel: nothing happens.
    desk.press("9", "admin_reset").await;
    desk.press("9", "admin_reset_cancel").await;
    let sent = desk.press("9", "admin_reset_confirm").await;
    assert!(sent.text_to("9").contains("admin panel first"));

    // Warning then confirm: everything is gone.
    let sent = desk.press("9", "admin_reset").await;
    assert_eq!(
        sent.buttons_to("9"),
        vec!["admin_reset_confirm", "admin_reset_cancel"]
    );
    desk.press("9", "admin_reset_confirm").await;
    assert!(desk.db.list_accounts().await.unwrap().is_empty());
    assert!(desk.db.list_requests().await.unwrap().is_empty());
    assert!(desk.db.list_sessions().await.unwrap().is_empty());
    assert_eq!(desk.db.get_settings().await.unwrap(), Settings::default());
    assert!(desk.db.get_admin().await.unwrap().is_none());
    assert_eq!(desk.conversations.len().await, 0);

    // A fresh claim now succeeds.
    desk.text("5", PHRASE).await;
    let admin = desk.db.get_admin().await.unwrap().unwrap();
    assert_eq!(admin.identity, Identity::new("5"));
}

#[tokio::test]
async fn racing_consultants_exactly_one_takes_the_request() {
    let desk = Desk::new().await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    let bob = desk.active("2", "Bob", AccountRole::Consultant).await;
    let carol = desk.active("3", "Carol", AccountRole::Consultant).await;
    let rid = desk.open_request(&alice, Some("Monday")).await;

    let take = |who: &str| {
        InboundEvent::new(
            who,
            EventKind::Callback {
                data: format!("take_request_{rid}"),
                callback_id: None,
            },
        )
    };
    let (a, b) = (take("2"), take("3"));
    tokio::join!(desk.engine.handle(&a), desk.engine.handle(&b));
    let sent = Sent(std::mem::take(&mut *desk.recorder.sent.lock().await));

    let winners: Vec<&str> = ["2", "3"]
        .into_iter()
        .filter(|who| sent.text_to(who).contains("You took request"))
        .collect();
    assert_eq!(winners.len(), 1);

    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Taken);
    let expected = if winners[0] == "2" { bob.id } else { carol.id };
    assert_eq!(req.consultant_id, Some(expected));
}

#[tokio::test]
async fn only_owner_can_cancel_and_consultant_is_told() {
    let desk = Desk::new().await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("4", "Eve", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;
    let rid = desk.open_request(&alice, None).await;
    desk.press("2", &format!("take_request_{rid}")).await;

    let sent = desk.press("4", &format!("cancel_request_{rid}")).await;
    assert!(sent.text_to("4").contains("Only the client"));
    assert_eq!(
        desk.db.get_request(rid).await.unwrap().unwrap().status,
        RequestStatus::Taken
    );

    let sent = desk.press("1", &format!("cancel_request_{rid}")).await;
    assert!(sent.text_to("2").contains("cancelled"));
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Cancelled);
    assert_eq!(req.consultant_id, None);
}

#[tokio::test]
async fn return_to_pool_clears_consultant_and_tells_client() {
    let desk = Desk::new().await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;
    desk.active("3", "Carol", AccountRole::Consultant).await;
    let rid = desk.open_request(&alice, None).await;
    desk.press("2", &format!("take_request_{rid}")).await;

    let sent = desk.press("3", &format!("return_request_{rid}")).await;
    assert!(sent.text_to("3").contains("assigned consultant"));

    let sent = desk.press("2", &format!("return_request_{rid}")).await;
    assert!(sent.text_to("1").contains("returned your request"));
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Open);
    assert_eq!(req.consultant_id, None);
}

#[tokio::test]
async fn accepting_client_time_needs_a_time() {
    let desk = Desk::new().await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;
    let rid = desk.open_request(&alice, None).await;
    desk.press("2", &format!("take_request_{rid}")).await;

    let sent = desk.press("2", &format!("accept_client_time_{rid}")).await;
    assert!(sent.text_to("2").contains("has not suggested a time"));
    assert!(desk.db.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn paused_booking_blocks_new_requests() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    desk.active("1", "Alice", AccountRole::Client).await;
    desk.press("9", "toggle_consultations").await;

    let sent = desk.press("1", "create_request").await;
    assert!(sent.text_to("1").contains("paused"));
}

#[tokio::test]
async fn outsiders_cannot_confirm_and_admin_can_prompt() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;
    desk.active("4", "Eve", AccountRole::Client).await;
    let rid = desk.open_request(&alice, Some("Tuesday")).await;
    desk.press("2", &format!("take_request_{rid}")).await;
    desk.press("2", &format!("accept_client_time_{rid}")).await;
    let sid = desk.db.list_sessions().await.unwrap()[0].id;

    let sent = desk.press("4", &format!("confirm_session_yes_{sid}")).await;
    assert!(sent.text_to("4").contains("not a participant"));

    let sent = desk.press("9", &format!("ask_confirm_{sid}")).await;
    for who in ["1", "2"] {
        assert_eq!(
            sent.buttons_to(who),
            vec![
                format!("confirm_session_yes_{sid}"),
                format!("confirm_session_no_{sid}")
            ]
        );
    }

    let sent = desk.press("9", &format!("admin_cancel_session_{sid}")).await;
    assert!(sent.text_to("1").contains("cancelled by the administrator"));
    let s = desk.db.get_session(sid).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Cancelled);
}

#[tokio::test]
async fn blocked_account_loses_access_and_admin_cannot_be_blocked() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    let admin = desk.account("9").await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;

    let sent = desk.press("9", &format!("block_user_{}", alice.id)).await;
    assert!(sent.text_to("1").contains("blocked"));
    let sent = desk.press("1", "create_request").await;
    assert!(sent.text_to("1").contains("not active"));

    desk.press("9", &format!("unblock_user_{}", alice.id)).await;
    assert!(desk.account("1").await.is_active());

    let sent = desk.press("9", &format!("block_user_{}", admin.id)).await;
    assert!(sent.text_to("9").contains("cannot be blocked"));
    assert!(desk.account("9").await.is_active());
}

#[tokio::test]
async fn admin_changes_role_and_target_is_notified() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;

    let sent = desk
        .press("9", &format!("changerole_consultant_{}", alice.id))
        .await;
    assert!(sent.text_to("1").contains("consultant"));
    assert_eq!(desk.account("1").await.role, AccountRole::Consultant);

    let sent = desk
        .press("9", &format!("changerole_consultant_{}", alice.id))
        .await;
    assert!(sent.text_to("9").contains("already a consultant"));
}

#[tokio::test]
async fn non_admin_cannot_use_admin_panel() {
    let desk = Desk::new().await;
    desk.active("1", "Alice", AccountRole::Client).await;
    let sent = desk.command("1", "admin").await;
    assert!(sent.text_to("1").contains("only available to the administrator"));
    let sent = desk.press("1", "toggle_registration").await;
    assert!(sent.text_to("1").contains("only available to the administrator"));
    assert!(desk.db.get_settings().await.unwrap().registration_enabled);
}

#[tokio::test]
async fn both_confirmations_false_mean_not_happened() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;
    let rid = desk.open_request(&alice, Some("Thursday")).await;
    let sid = desk.scheduled("2", rid).await;

    desk.press("1", &format!("confirm_session_no_{sid}")).await;
    let sent = desk.press("2", &format!("confirm_session_no_{sid}")).await;
    assert!(sent.text_to("2").contains("did not take place"));
    assert!(sent.to("9").is_empty());

    let s = desk.db.get_session(sid).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::NotHappened);
    assert_eq!(s.client_confirmed, Some(false));
    assert_eq!(s.consultant_confirmed, Some(false));
}

#[tokio::test]
async fn admin_rejects_registration_and_applicant_is_told() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    desk.press("3", "register_client").await;
    desk.text("3", "Mallory").await;
    desk.text("3", "-").await;
    desk.text("3", "-").await;
    let mallory = desk.account("3").await;
    assert_eq!(mallory.status, AccountStatus::Pending);

    let sent = desk.press("9", &format!("reject_user_{}", mallory.id)).await;
    assert!(sent.text_to("3").contains("rejected"));
    assert!(sent.text_to("9").contains("rejected"));
    assert_eq!(desk.account("3").await.status, AccountStatus::Rejected);

    let sent = desk.press("9", &format!("approve_user_{}", mallory.id)).await;
    assert!(sent.text_to("9").contains("already been processed"));
    assert_eq!(desk.account("3").await.status, AccountStatus::Rejected);
}

#[tokio::test]
async fn admin_cancels_requests_at_any_live_stage() {
    let desk = Desk::new().await;
    desk.text("9", PHRASE).await;
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;

    // Open: only the client hears about it.
    let open = desk.open_request(&alice, None).await;
    let sent = desk.press("9", &format!("admin_cancel_req_{open}")).await;
    assert!(sent.text_to("1").contains("cancelled by the administrator"));
    assert!(sent.to("2").is_empty());
    assert_eq!(
        desk.db.get_request(open).await.unwrap().unwrap().status,
        RequestStatus::Cancelled
    );

    // Scheduled: both parties hear, the consultant is cleared and the
    // session goes with it.
    let rid = desk.open_request(&alice, Some("Wednesday")).await;
    let sid = desk.scheduled("2", rid).await;
    let sent = desk.press("9", &format!("admin_cancel_req_{rid}")).await;
    assert!(sent.text_to("1").contains("cancelled by the administrator"));
    assert!(sent.text_to("2").contains("cancelled by the administrator"));
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Cancelled);
    assert_eq!(req.consultant_id, None);
    let s = desk.db.get_session(sid).await.unwrap().unwrap();
    assert_eq!(s.status, SessionStatus::Cancelled);

    // Already cancelled: refused.
    let sent = desk.press("9", &format!("admin_cancel_req_{rid}")).await;
    assert!(sent.text_to("9").contains("not possible"));
}

/// Repository whose scheduling write fails while `failing` is set.
struct FailingSchedule {
    inner: LibSqlBackend,
    failing: AtomicBool,
}

#[async_trait]
impl Database for FailingSchedule {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.inner.run_migrations().await
    }
    async fn create_account(&self, a: &NewAccount) -> Result<Account, DatabaseError> {
        self.inner.create_account(a).await
    }
    async fn get_account(&self, id: i64) -> Result<Option<Account>, DatabaseError> {
        self.inner.get_account(id).await
    }
    async fn get_account_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<Account>, DatabaseError> {
        self.inner.get_account_by_identity(identity).await
    }
    async fn list_accounts(&self) -> Result<Vec<Account>, DatabaseError> {
        self.inner.list_accounts().await
    }
    async fn list_accounts_by_role(
        &self,
        role: AccountRole,
    ) -> Result<Vec<Account>, DatabaseError> {
        self.inner.list_accounts_by_role(role).await
    }
    async fn list_accounts_by_role_and_status(
        &self,
        role: AccountRole,
        status: AccountStatus,
    ) -> Result<Vec<Account>, DatabaseError> {
        self.inner.list_accounts_by_role_and_status(role, status).await
    }
    async fn update_account(
        &self,
        id: i64,
        patch: &AccountPatch,
    ) -> Result<Option<Account>, DatabaseError> {
        self.inner.update_account(id, patch).await
    }
    async fn get_admin(&self) -> Result<Option<Account>, DatabaseError> {
        self.inner.get_admin().await
    }
    async fn claim_admin(&self, id: i64) -> Result<Option<Account>, DatabaseError> {
        self.inner.claim_admin(id).await
    }
    async fn create_admin(&self, a: &NewAccount) -> Result<Option<Account>, DatabaseError> {
        self.inner.create_admin(a).await
    }
    async fn create_request(&self, r: &NewRequest) -> Result<ConsultationRequest, DatabaseError> {
        self.inner.create_request(r).await
    }
    async fn get_request(&self, id: i64) -> Result<Option<ConsultationRequest>, DatabaseError> {
        self.inner.get_request(id).await
    }
    async fn list_requests(&self) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.inner.list_requests().await
    }
    async fn list_requests_by_client(
        &self,
        id: i64,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.inner.list_requests_by_client(id).await
    }
    async fn list_requests_by_consultant(
        &self,
        id: i64,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.inner.list_requests_by_consultant(id).await
    }
    async fn list_requests_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.inner.list_requests_by_status(status).await
    }
    async fn update_request_if(
        &self,
        id: i64,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<ConsultationRequest>, DatabaseError> {
        self.inner.update_request_if(id, expected, patch).await
    }
    async fn schedule_request(
        &self,
        id: i64,
        expected: RequestStatus,
        patch: &RequestPatch,
        session: &NewSession,
    ) -> Result<Option<(ConsultationRequest, ConsultationSession)>, DatabaseError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("disk I/O error".into()));
        }
        self.inner
            .schedule_request(id, expected, patch, session)
            .await
    }
    async fn get_session(&self, id: i64) -> Result<Option<ConsultationSession>, DatabaseError> {
        self.inner.get_session(id).await
    }
    async fn list_sessions(&self) -> Result<Vec<ConsultationSession>, DatabaseError> {
        self.inner.list_sessions().await
    }
    async fn list_sessions_by_client(
        &self,
        id: i64,
    ) -> Result<Vec<ConsultationSession>, DatabaseError> {
        self.inner.list_sessions_by_client(id).await
    }
    async fn list_sessions_by_consultant(
        &self,
        id: i64,
    ) -> Result<Vec<ConsultationSession>, DatabaseError> {
        self.inner.list_sessions_by_consultant(id).await
    }
    async fn set_session_confirmation(
        &self,
        id: i64,
        party: Party,
        happened: bool,
    ) -> Result<Option<ConsultationSession>, DatabaseError> {
        self.inner.set_session_confirmation(id, party, happened).await
    }
    async fn update_session_status_if(
        &self,
        id: i64,
        expected: SessionStatus,
        status: SessionStatus,
    ) -> Result<Option<ConsultationSession>, DatabaseError> {
        self.inner.update_session_status_if(id, expected, status).await
    }
    async fn get_settings(&self) -> Result<Settings, DatabaseError> {
        self.inner.get_settings().await
    }
    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, DatabaseError> {
        self.inner.update_settings(patch).await
    }
    async fn reset_all(&self) -> Result<(), DatabaseError> {
        self.inner.reset_all().await
    }
}

#[tokio::test]
async fn failed_scheduling_leaves_request_retryable() {
    let db = Arc::new(FailingSchedule {
        inner: LibSqlBackend::new_memory().await.unwrap(),
        failing: AtomicBool::new(true),
    });
    let desk = Desk::over(db.clone());
    let alice = desk.active("1", "Alice", AccountRole::Client).await;
    desk.active("2", "Bob", AccountRole::Consultant).await;
    let rid = desk.open_request(&alice, Some("Monday 09:00")).await;
    desk.press("2", &format!("take_request_{rid}")).await;

    let sent = desk.press("2", &format!("accept_client_time_{rid}")).await;
    assert!(sent.text_to("2").contains("went wrong"));
    assert!(sent.to("1").is_empty());
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Taken);
    assert!(desk.db.list_sessions().await.unwrap().is_empty());

    db.failing.store(false, Ordering::SeqCst);
    let sent = desk.press("2", &format!("accept_client_time_{rid}")).await;
    assert!(sent.text_to("1").contains("Monday 09:00"));
    let req = desk.db.get_request(rid).await.unwrap().unwrap();
    assert_eq!(req.status, RequestStatus::Scheduled);
    let sessions = desk.db.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].request_id, rid);
}
