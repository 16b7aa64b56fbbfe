//! Chat screens: menus, listings, and prompts built as [`OutgoingMessage`]s.
//!
//! Pure functions over domain records, so the button logic can be tested
//! without a channel or a database.

use crate::channels::{Button, OutgoingMessage};
use crate::domain::{
    Account, AccountRole, AccountStatus, ConsultationRequest, ConsultationSession, Party,
    RequestStatus, RequestTransition, Settings,
};

use super::action::{Action, AdminAction};

fn btn(label: impl Into<String>, action: impl Into<Action>) -> Button {
    Button::new(label, action.into().encode())
}

fn single(label: impl Into<String>, action: impl Into<Action>) -> Vec<Button> {
    vec![btn(label, action)]
}

fn or_none(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("none")
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn confirm_buttons(session_id: i64) -> Vec<Vec<Button>> {
    vec![
        single(
            "Yes, it took place",
            Action::ConfirmSession {
                session_id,
                happened: true,
            },
        ),
        single(
            "No, it did not take place",
            Action::ConfirmSession {
                session_id,
                happened: false,
            },
        ),
    ]
}

fn with_rows(mut msg: OutgoingMessage, rows: Vec<Vec<Button>>) -> OutgoingMessage {
    for row in rows {
        msg = msg.row(row);
    }
    msg
}

// ── General ─────────────────────────────────────────────────────────

pub fn welcome() -> OutgoingMessage {
    OutgoingMessage::text(
        "Welcome to the consultation desk!\n\n\
         This bot helps clients find consultants, agree on a consultation, \
         and confirm that it took place.\n\n\
         Choose a role to register:",
    )
    .row(single("Register as a client", Action::RegisterClient))
    .row(single("Register as a consultant", Action::RegisterConsultant))
    .row(single("What can this bot do?", Action::BotHelp))
}

pub fn registration_closed() -> OutgoingMessage {
    OutgoingMessage::text("Welcome!\n\nRegistration is currently closed. Please try again later.")
}

pub fn help() -> OutgoingMessage {
    OutgoingMessage::text(
        "What this bot does:\n\n\
         1. Clients create consultation requests on the topics they need\n\
         2. Consultants browse the requests and take them\n\
         3. The consultant proposes a time and the client confirms it\n\
         4. After the consultation both sides confirm whether it took place\n\
         5. The administrator oversees the whole process\n\n\
         Use /start to register.",
    )
}

/// Greeting for `/start` when the identity already has an account that is
/// not active.
pub fn account_state(account: &Account) -> OutgoingMessage {
    let text = match account.status {
        AccountStatus::Pending => format!(
            "Hello, {}!\n\nYour registration is waiting for administrator approval.",
            account.full_name
        ),
        AccountStatus::Rejected => format!(
            "Hello, {}.\n\nYour registration was rejected by the administrator.",
            account.full_name
        ),
        AccountStatus::Blocked => "Your account has been blocked by the administrator.".into(),
        AccountStatus::Active => format!("Welcome back, {}!", account.full_name),
    };
    OutgoingMessage::text(text)
}

pub fn admin_welcome(account: &Account) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "Welcome, administrator {}!\n\nUse /admin for the admin panel or /menu for the main menu.",
        account.full_name
    ))
}

pub fn client_menu(account: &Account) -> OutgoingMessage {
    OutgoingMessage::text(format!("Client menu ({}):", account.full_name))
        .row(single("Request a consultation", Action::CreateRequest))
        .row(single("My requests", Action::MyRequests))
        .row(single("My consultations", Action::MySessions(Party::Client)))
        .row(single("Profile", Action::MyProfile))
}

pub fn consultant_menu(account: &Account) -> OutgoingMessage {
    OutgoingMessage::text(format!("Consultant menu ({}):", account.full_name))
        .row(single("Available client requests", Action::AvailableRequests))
        .row(single("My taken requests", Action::MyTakenRequests))
        .row(single("My consultations", Action::MySessions(Party::Consultant)))
        .row(single("Profile", Action::MyProfile))
}

pub fn profile(account: &Account) -> OutgoingMessage {
    let mut text = format!(
        "Your profile:\n\nName: {}\nRole: {}\nStatus: {}",
        account.full_name, account.role, account.status
    );
    if let Some(u) = account.username.as_deref() {
        text.push_str(&format!("\nUsername: @{u}"));
    }
    let optional = [
        ("Description", &account.description),
        ("Competencies", &account.competencies),
        ("Experience", &account.experience),
        ("Contact", &account.contact),
        ("Time zone", &account.timezone),
    ];
    for (label, value) in optional {
        if let Some(v) = value {
            text.push_str(&format!("\n{label}: {v}"));
        }
    }
    OutgoingMessage::text(text).row(single("Menu", Action::BackToMenu))
}

// ── Client screens ──────────────────────────────────────────────────

pub fn no_requests() -> OutgoingMessage {
    OutgoingMessage::text("You have no consultation requests.")
        .row(single("Menu", Action::BackToMenu))
}

/// One entry of the client's "my requests" list.
pub fn client_request_card(request: &ConsultationRequest) -> OutgoingMessage {
    let mut msg = OutgoingMessage::text(format!(
        "Request #{}\nTopic: {}\nStatus: {}",
        request.id,
        request.topic,
        request.status.label()
    ))
    .row(single("Details", Action::ViewRequest(request.id)));

    if request.status.apply(&RequestTransition::ClientCancel).is_ok() {
        msg = msg.row(single("Cancel", Action::CancelRequest(request.id)));
    }
    msg
}

pub fn request_detail(
    request: &ConsultationRequest,
    consultant: Option<&Account>,
) -> OutgoingMessage {
    let mut text = format!(
        "Request #{}\n\nTopic: {}\nPreferred time: {}\nDetails: {}\nStatus: {}",
        request.id,
        request.topic,
        request.preferred_time.as_deref().unwrap_or("not specified"),
        or_none(request.details.as_deref()),
        request.status.label()
    );
    if let Some(c) = consultant {
        text.push_str(&format!("\nConsultant: {}", c.full_name));
    }
    OutgoingMessage::text(text)
}

/// Sent to the client when the consultant proposes a time.
pub fn time_proposed(
    request: &ConsultationRequest,
    consultant: &Account,
    time: &str,
) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "Consultant {} proposes to hold the consultation \"{}\" at: {time}.\n\nDo you confirm?",
        consultant.full_name, request.topic
    ))
    .row(single("Confirm", Action::AcceptTime(request.id)))
    .row(single("Suggest another time", Action::RejectTime(request.id)))
}

// ── Consultant screens ──────────────────────────────────────────────

pub fn available_request_card(
    request: &ConsultationRequest,
    client: Option<&Account>,
) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "Request #{}\nTopic: {}\nClient: {}\nPreferred time: {}",
        request.id,
        request.topic,
        client.map(|c| c.full_name.as_str()).unwrap_or("unknown"),
        request.preferred_time.as_deref().unwrap_or("not specified")
    ))
    .row(single("Take request", Action::TakeRequest(request.id)))
}

/// Reply to the consultant right after taking a request.
pub fn request_taken(request_id: i64) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "You took request #{request_id}. Now propose a time for the consultation."
    ))
    .row(single("Propose a time", Action::ProposeTime(request_id)))
    .row(single("Return to the pool", Action::ReturnRequest(request_id)))
}

pub fn taken_request_card(
    request: &ConsultationRequest,
    client: Option<&Account>,
) -> OutgoingMessage {
    let mut text = format!(
        "Request #{}\nTopic: {}\nClient: {}\nStatus: {}",
        request.id,
        request.topic,
        client.map(|c| c.full_name.as_str()).unwrap_or("?"),
        request.status.label()
    );
    if let Some(t) = request.preferred_time.as_deref() {
        text.push_str(&format!("\nTime: {t}"));
    }

    let mut msg = OutgoingMessage::text(text);
    if request.status == RequestStatus::Taken {
        if request.preferred_time.is_some() {
            msg = msg.row(single(
                "Accept the client's time",
                Action::AcceptClientTime(request.id),
            ));
        }
        msg = msg.row(single("Propose a time", Action::ProposeTime(request.id)));
    }
    if request.status.apply(&RequestTransition::ReturnToPool).is_ok() {
        msg = msg.row(single("Return to the pool", Action::ReturnRequest(request.id)));
    }
    msg
}

/// Sent to the consultant when the client counters with another time.
pub fn counter_offer(
    request: &ConsultationRequest,
    client: &Account,
    time: &str,
) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "Client {} suggests another time for the consultation \"{}\": {time}\n\n\
         You can accept this time or propose your own.",
        client.full_name, request.topic
    ))
    .row(single("Accept this time", Action::AcceptClientTime(request.id)))
    .row(single("Propose my own time", Action::ProposeTime(request.id)))
    .row(single("Return the request", Action::ReturnRequest(request.id)))
}

// ── Sessions ────────────────────────────────────────────────────────

/// One entry of a participant's "my consultations" list. Confirmation
/// buttons appear only while the session is open and this party has not
/// answered yet.
pub fn session_card(
    session: &ConsultationSession,
    viewer: Party,
    counterpart: Option<&Account>,
) -> OutgoingMessage {
    let other_label = match viewer {
        Party::Client => "Consultant",
        Party::Consultant => "Client",
    };
    let msg = OutgoingMessage::text(format!(
        "Consultation #{}\nTopic: {}\n{other_label}: {}\nDate/time: {}\nStatus: {}",
        session.id,
        session.topic,
        counterpart.map(|a| a.full_name.as_str()).unwrap_or("?"),
        session.scheduled_at,
        session.status.label()
    ));

    if !session.status.is_terminal() && session.confirmation_of(viewer).is_none() {
        with_rows(msg, confirm_buttons(session.id))
    } else {
        msg
    }
}

/// Prompt pushed to a participant asking whether the session happened.
pub fn confirmation_prompt(session: &ConsultationSession, counterpart: &str) -> OutgoingMessage {
    with_rows(
        OutgoingMessage::text(format!(
            "Did your consultation with {counterpart} on \"{}\" ({}) take place?",
            session.topic, session.scheduled_at
        )),
        confirm_buttons(session.id),
    )
}

// ── Admin screens ───────────────────────────────────────────────────

pub fn admin_panel() -> OutgoingMessage {
    OutgoingMessage::text("Admin panel:")
        .row(single("Pending registrations", AdminAction::Pending))
        .row(single("Clients", AdminAction::Accounts(AccountRole::Client)))
        .row(single(
            "Consultants",
            AdminAction::Accounts(AccountRole::Consultant),
        ))
        .row(single("Consultation requests", AdminAction::Requests))
        .row(single("Consultations", AdminAction::Sessions))
        .row(single("Registration and booking switches", AdminAction::Settings))
        .row(single("Reset the bot (delete everything)", AdminAction::Reset))
}

fn back(action: AdminAction) -> Vec<Button> {
    single("Back", action)
}

pub fn pending_overview(clients: usize, consultants: usize) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "Awaiting approval:\nClients: {clients}\nConsultants: {consultants}"
    ))
    .row(single(
        "Review clients",
        AdminAction::PendingList(AccountRole::Client),
    ))
    .row(single(
        "Review consultants",
        AdminAction::PendingList(AccountRole::Consultant),
    ))
    .row(back(AdminAction::Panel))
}

pub fn empty_list(text: &str, back_to: AdminAction) -> OutgoingMessage {
    OutgoingMessage::text(text).row(back(back_to))
}

/// Profile summary with approve / reject buttons, used both for the pending
/// list and for the new-registration notice.
pub fn pending_account_card(account: &Account, heading: &str) -> OutgoingMessage {
    let mut text = format!(
        "{heading}\nName: {}\nUsername: {}",
        account.full_name,
        account.handle()
    );
    match account.role {
        AccountRole::Consultant => text.push_str(&format!(
            "\nCompetencies: {}\nExperience: {}\nTime zone: {}",
            or_none(account.competencies.as_deref()),
            or_none(account.experience.as_deref()),
            or_none(account.timezone.as_deref())
        )),
        _ => text.push_str(&format!(
            "\nDescription: {}\nContact: {}",
            or_none(account.description.as_deref()),
            or_none(account.contact.as_deref())
        )),
    }
    OutgoingMessage::text(text)
        .row(single("Approve", AdminAction::Approve(account.id)))
        .row(single("Reject", AdminAction::Reject(account.id)))
}

/// Accounts of one role with block / unblock / role-change buttons.
pub fn account_list(role: AccountRole, accounts: &[Account]) -> OutgoingMessage {
    let (title, switch_to) = match role {
        AccountRole::Consultant => ("Consultants", AccountRole::Client),
        _ => ("Clients", AccountRole::Consultant),
    };
    let mut text = format!("{title}:\n\n");
    let mut rows = Vec::new();
    for a in accounts {
        text.push_str(&format!(
            "[{}] {} ({}) - {}\n",
            a.id,
            a.full_name,
            a.handle(),
            a.status
        ));
        if a.is_admin() {
            continue;
        }
        match a.status {
            AccountStatus::Active => {
                rows.push(single(
                    format!("Make {switch_to}: {}", a.full_name),
                    AdminAction::ChangeRole {
                        role: switch_to,
                        account_id: a.id,
                    },
                ));
                rows.push(single(
                    format!("Block {}", a.full_name),
                    AdminAction::Block(a.id),
                ));
            }
            AccountStatus::Blocked => rows.push(single(
                format!("Unblock {}", a.full_name),
                AdminAction::Unblock(a.id),
            )),
            AccountStatus::Pending | AccountStatus::Rejected => {}
        }
    }
    rows.push(back(AdminAction::Panel));
    with_rows(OutgoingMessage::text(text.trim_end()), rows)
}

pub fn requests_overview(counts: &[(RequestStatus, usize)]) -> OutgoingMessage {
    let mut text = String::from("Consultation requests:\n");
    for (status, n) in counts {
        text.push_str(&format!("\n{}: {n}", status.label()));
    }
    let mut rows: Vec<Vec<Button>> = RequestStatus::ALL
        .iter()
        .filter(|s| **s != RequestStatus::Cancelled)
        .map(|s| single(s.label(), AdminAction::RequestsByStatus(*s)))
        .collect();
    rows.push(back(AdminAction::Panel));
    with_rows(OutgoingMessage::text(text), rows)
}

pub fn admin_request_card(
    request: &ConsultationRequest,
    client: Option<&Account>,
    consultant: Option<&Account>,
) -> OutgoingMessage {
    let mut text = format!(
        "Request #{}\nTopic: {}\nClient: {}\nStatus: {}",
        request.id,
        request.topic,
        client.map(|c| c.full_name.as_str()).unwrap_or("unknown"),
        request.status.label()
    );
    if let Some(c) = consultant {
        text.push_str(&format!("\nConsultant: {}", c.full_name));
    }
    if let Some(t) = request.preferred_time.as_deref() {
        text.push_str(&format!("\nPreferred time: {t}"));
    }

    let mut msg = OutgoingMessage::text(text);
    if request.status.apply(&RequestTransition::AdminCancel).is_ok() {
        msg = msg.row(single(
            "Cancel request",
            AdminAction::CancelRequest(request.id),
        ));
    }
    msg.row(back(AdminAction::Requests))
}

pub fn admin_session_card(
    session: &ConsultationSession,
    client: Option<&Account>,
    consultant: Option<&Account>,
) -> OutgoingMessage {
    let mut text = format!(
        "Consultation #{}\nTopic: {}\nClient: {}\nConsultant: {}\nDate/time: {}\nStatus: {}",
        session.id,
        session.topic,
        client.map(|c| c.full_name.as_str()).unwrap_or("?"),
        consultant.map(|c| c.full_name.as_str()).unwrap_or("?"),
        session.scheduled_at,
        session.status.label()
    );
    if let Some(c) = session.client_confirmed {
        text.push_str(&format!("\nClient says it happened: {}", yes_no(c)));
    }
    if let Some(c) = session.consultant_confirmed {
        text.push_str(&format!("\nConsultant says it happened: {}", yes_no(c)));
    }

    let mut msg = OutgoingMessage::text(text);
    if !session.status.is_terminal() {
        msg = msg
            .row(single("Ask for confirmation", Action::AskConfirm(session.id)))
            .row(single("Cancel", AdminAction::CancelSession(session.id)));
    }
    msg.row(back(AdminAction::Panel))
}

/// Sent to the admin when the participants' answers disagree.
pub fn disagreement_notice(
    session: &ConsultationSession,
    client: Option<&Account>,
    consultant: Option<&Account>,
) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "Confirmations disagree for consultation #{} \"{}\" ({}).\nClient ({}): {}\nConsultant ({}): {}",
        session.id,
        session.topic,
        session.scheduled_at,
        client.map(|c| c.full_name.as_str()).unwrap_or("?"),
        session.client_confirmed.map(yes_no).unwrap_or("no answer"),
        consultant.map(|c| c.full_name.as_str()).unwrap_or("?"),
        session.consultant_confirmed.map(yes_no).unwrap_or("no answer"),
    ))
    .row(single("Consultations", AdminAction::Sessions))
}

pub fn settings(settings: &Settings) -> OutgoingMessage {
    OutgoingMessage::text(format!(
        "Current settings:\n\nUser registration: {}\nConsultation booking: {}",
        if settings.registration_enabled { "enabled" } else { "disabled" },
        if settings.consultations_enabled { "enabled" } else { "paused" },
    ))
    .row(single(
        if settings.registration_enabled {
            "Disable registration"
        } else {
            "Enable registration"
        },
        AdminAction::ToggleRegistration,
    ))
    .row(single(
        if settings.consultations_enabled {
            "Pause booking"
        } else {
            "Enable booking"
        },
        AdminAction::ToggleConsultations,
    ))
    .row(back(AdminAction::Panel))
}

pub fn reset_warning() -> OutgoingMessage {
    OutgoingMessage::text(
        "WARNING: every account, request, and consultation will be deleted and the bot \
         will return to its initial state. This cannot be undone.",
    )
    .row(single("Confirm reset", AdminAction::ResetConfirm))
    .row(single("Cancel", AdminAction::ResetCancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::domain::{Identity, SessionStatus};

    fn account(id: i64, role: AccountRole, status: AccountStatus) -> Account {
        Account {
            id,
            identity: Identity::new(id.to_string()),
            full_name: format!("User {id}"),
            username: None,
            role,
            status,
            description: None,
            competencies: None,
            experience: None,
            timezone: None,
            contact: None,
            created_at: Utc::now(),
        }
    }

    fn request(status: RequestStatus) -> ConsultationRequest {
        ConsultationRequest {
            id: 4,
            client_id: 1,
            topic: "Tax planning".into(),
            preferred_time: Some("2026-03-15 14:00".into()),
            details: None,
            status,
            consultant_id: status.has_consultant().then_some(2),
            created_at: Utc::now(),
        }
    }

    fn session(client: Option<bool>, consultant: Option<bool>) -> ConsultationSession {
        ConsultationSession {
            id: 9,
            request_id: 4,
            client_id: 1,
            consultant_id: 2,
            scheduled_at: "2026-03-17 09:00".into(),
            topic: "Tax planning".into(),
            status: SessionStatus::Scheduled,
            client_confirmed: client,
            consultant_confirmed: consultant,
            created_at: Utc::now(),
        }
    }

    fn data(msg: &OutgoingMessage) -> Vec<&str> {
        msg.button_data().collect()
    }

    #[test]
    fn client_can_cancel_only_before_scheduling() {
        assert!(data(&client_request_card(&request(RequestStatus::Open))).contains(&"cancel_request_4"));
        assert!(
            data(&client_request_card(&request(RequestStatus::TimeProposed)))
                .contains(&"cancel_request_4")
        );
        assert!(
            !data(&client_request_card(&request(RequestStatus::Scheduled)))
                .contains(&"cancel_request_4")
        );
    }

    #[test]
    fn session_card_hides_buttons_after_own_answer() {
        let open = session(None, Some(true));
        assert_eq!(
            data(&session_card(&open, Party::Client, None)),
            vec!["confirm_session_yes_9", "confirm_session_no_9"]
        );
        assert!(data(&session_card(&open, Party::Consultant, None)).is_empty());

        let mut resolved = session(Some(true), Some(true));
        resolved.status = SessionStatus::Completed;
        assert!(data(&session_card(&resolved, Party::Client, None)).is_empty());
    }

    #[test]
    fn account_list_never_offers_actions_on_admin() {
        let accounts = vec![
            account(1, AccountRole::Client, AccountStatus::Active),
            account(2, AccountRole::Client, AccountStatus::Blocked),
            account(3, AccountRole::Client, AccountStatus::Pending),
        ];
        let msg = account_list(AccountRole::Client, &accounts);
        assert_eq!(
            data(&msg),
            vec![
                "changerole_consultant_1",
                "block_user_1",
                "unblock_user_2",
                "admin_back"
            ]
        );

        let admin = vec![account(5, AccountRole::Admin, AccountStatus::Active)];
        assert_eq!(data(&account_list(AccountRole::Client, &admin)), vec!["admin_back"]);
    }

    #[test]
    fn taken_request_offers_client_time_when_present() {
        let msg = taken_request_card(&request(RequestStatus::Taken), None);
        assert_eq!(
            data(&msg),
            vec!["accept_client_time_4", "propose_time_4", "return_request_4"]
        );
        let msg = taken_request_card(&request(RequestStatus::TimeProposed), None);
        assert_eq!(data(&msg), vec!["return_request_4"]);
    }

    #[test]
    fn scheduled_request_cannot_be_returned() {
        let msg = taken_request_card(&request(RequestStatus::Scheduled), None);
        assert!(data(&msg).is_empty());
        assert!(msg.text.contains("Status: "));
    }

    #[test]
    fn admin_cards_offer_cancel_while_live() {
        assert!(
            data(&admin_request_card(&request(RequestStatus::Scheduled), None, None))
                .contains(&"admin_cancel_req_4")
        );
        assert!(
            !data(&admin_request_card(&request(RequestStatus::Cancelled), None, None))
                .contains(&"admin_cancel_req_4")
        );
        assert!(
            data(&admin_session_card(&session(None, None), None, None))
                .contains(&"ask_confirm_9")
        );
    }

    #[test]
    fn settings_buttons_reflect_state() {
        let msg = settings(&Settings {
            registration_enabled: false,
            consultations_enabled: true,
        });
        assert_eq!(msg.buttons[0][0].label, "Enable registration");
        assert_eq!(msg.buttons[1][0].label, "Pause booking");
    }

    #[test]
    fn pending_card_shows_role_fields() {
        let mut c = account(7, AccountRole::Consultant, AccountStatus::Pending);
        c.competencies = Some("tax law".into());
        let msg = pending_account_card(&c, "New consultant registration:");
        assert!(msg.text.contains("Competencies: tax law"));
        assert!(msg.text.contains("Experience: none"));
        assert_eq!(data(&msg), vec!["approve_user_7", "reject_user_7"]);
    }
}
