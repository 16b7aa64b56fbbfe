//! Callback actions carried by inline buttons.
//!
//! Button data is a short string such as `take_request_12`. It is parsed
//! once, at the engine boundary, into an [`Action`]; handlers never look at
//! the raw string.

use crate::domain::{AccountRole, Party, RequestStatus};

/// Everything a button press can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    BotHelp,
    RegisterClient,
    RegisterConsultant,
    MyProfile,
    BackToMenu,

    // Client
    CreateRequest,
    MyRequests,
    ViewRequest(i64),
    CancelRequest(i64),
    AcceptTime(i64),
    RejectTime(i64),

    // Consultant
    AvailableRequests,
    TakeRequest(i64),
    MyTakenRequests,
    ProposeTime(i64),
    ReturnRequest(i64),
    AcceptClientTime(i64),

    // Sessions
    MySessions(Party),
    ConfirmSession { session_id: i64, happened: bool },
    AskConfirm(i64),

    Admin(AdminAction),
}

/// Admin panel actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Panel,
    Pending,
    PendingList(AccountRole),
    Approve(i64),
    Reject(i64),
    Accounts(AccountRole),
    Block(i64),
    Unblock(i64),
    ChangeRole { role: AccountRole, account_id: i64 },
    Requests,
    RequestsByStatus(RequestStatus),
    CancelRequest(i64),
    Sessions,
    CancelSession(i64),
    Settings,
    ToggleRegistration,
    ToggleConsultations,
    Reset,
    ResetConfirm,
    ResetCancel,
}

/// Parse `<prefix><id>`.
fn with_id(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.parse().ok()
}

impl Action {
    /// Parse button data. Unknown or malformed data yields `None`.
    pub fn parse(data: &str) -> Option<Action> {
        use Action::*;
        let exact = match data {
            "bot_help" => Some(BotHelp),
            "register_client" => Some(RegisterClient),
            "register_consultant" => Some(RegisterConsultant),
            "my_profile" => Some(MyProfile),
            "back_to_menu" => Some(BackToMenu),
            "create_request" => Some(CreateRequest),
            "my_requests" => Some(MyRequests),
            "available_requests" => Some(AvailableRequests),
            "my_taken_requests" => Some(MyTakenRequests),
            "my_sessions_client" => Some(MySessions(Party::Client)),
            "my_sessions_consultant" => Some(MySessions(Party::Consultant)),
            _ => None,
        };
        if exact.is_some() {
            return exact;
        }
        if data.starts_with("admin_")
            || data.starts_with("toggle_")
            || data.starts_with("approve_user_")
            || data.starts_with("reject_user_")
            || data.starts_with("block_user_")
            || data.starts_with("unblock_user_")
            || data.starts_with("changerole_")
        {
            return AdminAction::parse(data).map(Admin);
        }

        if let Some(id) = with_id(data, "view_request_") {
            return Some(ViewRequest(id));
        }
        if let Some(id) = with_id(data, "cancel_request_") {
            return Some(CancelRequest(id));
        }
        if let Some(id) = with_id(data, "accept_time_") {
            return Some(AcceptTime(id));
        }
        if let Some(id) = with_id(data, "reject_time_") {
            return Some(RejectTime(id));
        }
        if let Some(id) = with_id(data, "take_request_") {
            return Some(TakeRequest(id));
        }
        if let Some(id) = with_id(data, "propose_time_") {
            return Some(ProposeTime(id));
        }
        if let Some(id) = with_id(data, "return_request_") {
            return Some(ReturnRequest(id));
        }
        if let Some(id) = with_id(data, "accept_client_time_") {
            return Some(AcceptClientTime(id));
        }
        if let Some(id) = with_id(data, "confirm_session_yes_") {
            return Some(ConfirmSession {
                session_id: id,
                happened: true,
            });
        }
        if let Some(id) = with_id(data, "confirm_session_no_") {
            return Some(ConfirmSession {
                session_id: id,
                happened: false,
            });
        }
        if let Some(id) = with_id(data, "ask_confirm_") {
            return Some(AskConfirm(id));
        }
        None
    }

    /// Button data for this action; `Action::parse(&a.encode()) == Some(a)`.
    pub fn encode(&self) -> String {
        use Action::*;
        match self {
            BotHelp => "bot_help".into(),
            RegisterClient => "register_client".into(),
            RegisterConsultant => "register_consultant".into(),
            MyProfile => "my_profile".into(),
            BackToMenu => "back_to_menu".into(),
            CreateRequest => "create_request".into(),
            MyRequests => "my_requests".into(),
            ViewRequest(id) => format!("view_request_{id}"),
            CancelRequest(id) => format!("cancel_request_{id}"),
            AcceptTime(id) => format!("accept_time_{id}"),
            RejectTime(id) => format!("reject_time_{id}"),
            AvailableRequests => "available_requests".into(),
            TakeRequest(id) => format!("take_request_{id}"),
            MyTakenRequests => "my_taken_requests".into(),
            ProposeTime(id) => format!("propose_time_{id}"),
            ReturnRequest(id) => format!("return_request_{id}"),
            AcceptClientTime(id) => format!("accept_client_time_{id}"),
            MySessions(Party::Client) => "my_sessions_client".into(),
            MySessions(Party::Consultant) => "my_sessions_consultant".into(),
            ConfirmSession {
                session_id,
                happened: true,
            } => format!("confirm_session_yes_{session_id}"),
            ConfirmSession {
                session_id,
                happened: false,
            } => format!("confirm_session_no_{session_id}"),
            AskConfirm(id) => format!("ask_confirm_{id}"),
            Admin(a) => a.encode(),
        }
    }
}

impl AdminAction {
    fn parse(data: &str) -> Option<AdminAction> {
        use AdminAction::*;
        let exact = match data {
            "admin_back" => Some(Panel),
            "admin_pending" => Some(Pending),
            "admin_pending_clients" => Some(PendingList(AccountRole::Client)),
            "admin_pending_consultants" => Some(PendingList(AccountRole::Consultant)),
            "admin_clients" => Some(Accounts(AccountRole::Client)),
            "admin_consultants" => Some(Accounts(AccountRole::Consultant)),
            "admin_requests" => Some(Requests),
            "admin_sessions" => Some(Sessions),
            "admin_settings" => Some(Settings),
            "toggle_registration" => Some(ToggleRegistration),
            "toggle_consultations" => Some(ToggleConsultations),
            "admin_reset" => Some(Reset),
            "admin_reset_confirm" => Some(ResetConfirm),
            "admin_reset_cancel" => Some(ResetCancel),
            _ => None,
        };
        if exact.is_some() {
            return exact;
        }

        if let Some(status) = data.strip_prefix("admin_reqs_") {
            return status.parse().ok().map(RequestsByStatus);
        }
        if let Some(id) = with_id(data, "admin_cancel_req_") {
            return Some(CancelRequest(id));
        }
        if let Some(id) = with_id(data, "admin_cancel_session_") {
            return Some(CancelSession(id));
        }
        if let Some(id) = with_id(data, "approve_user_") {
            return Some(Approve(id));
        }
        if let Some(id) = with_id(data, "reject_user_") {
            return Some(Reject(id));
        }
        if let Some(id) = with_id(data, "block_user_") {
            return Some(Block(id));
        }
        if let Some(id) = with_id(data, "unblock_user_") {
            return Some(Unblock(id));
        }
        if let Some(rest) = data.strip_prefix("changerole_") {
            let (role, id) = rest.rsplit_once('_')?;
            let role: AccountRole = role.parse().ok()?;
            if !matches!(role, AccountRole::Client | AccountRole::Consultant) {
                return None;
            }
            return Some(ChangeRole {
                role,
                account_id: id.parse().ok()?,
            });
        }
        None
    }

    fn encode(&self) -> String {
        use AdminAction::*;
        match self {
            Panel => "admin_back".into(),
            Pending => "admin_pending".into(),
            PendingList(AccountRole::Consultant) => "admin_pending_consultants".into(),
            PendingList(_) => "admin_pending_clients".into(),
            Approve(id) => format!("approve_user_{id}"),
            Reject(id) => format!("reject_user_{id}"),
            Accounts(AccountRole::Consultant) => "admin_consultants".into(),
            Accounts(_) => "admin_clients".into(),
            Block(id) => format!("block_user_{id}"),
            Unblock(id) => format!("unblock_user_{id}"),
            ChangeRole { role, account_id } => format!("changerole_{role}_{account_id}"),
            Requests => "admin_requests".into(),
            RequestsByStatus(status) => format!("admin_reqs_{status}"),
            CancelRequest(id) => format!("admin_cancel_req_{id}"),
            Sessions => "admin_sessions".into(),
            CancelSession(id) => format!("admin_cancel_session_{id}"),
            Settings => "admin_settings".into(),
            ToggleRegistration => "toggle_registration".into(),
            ToggleConsultations => "toggle_consultations".into(),
            Reset => "admin_reset".into(),
            ResetConfirm => "admin_reset_confirm".into(),
            ResetCancel => "admin_reset_cancel".into(),
        }
    }
}

impl From<AdminAction> for Action {
    fn from(a: AdminAction) -> Self {
        Action::Admin(a)
    }
}
