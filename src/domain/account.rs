//! Accounts: the internal user record bound to one chat identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Identity;

/// What an account is allowed to do once active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Guest,
    Client,
    Consultant,
    Admin,
}

impl AccountRole {
    pub const ALL: [AccountRole; 4] = [Self::Guest, Self::Client, Self::Consultant, Self::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Client => "client",
            Self::Consultant => "consultant",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Self::Guest),
            "client" => Ok(Self::Client),
            "consultant" => Ok(Self::Consultant),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Unknown account role: {}", s)),
        }
    }
}

/// Moderation status of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Active,
    Rejected,
    Blocked,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 4] = [Self::Pending, Self::Active, Self::Rejected, Self::Blocked];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Blocked => "blocked",
        }
    }

    /// Moves the admin can make: approve, reject, block, unblock.
    pub fn can_transition_to(&self, target: AccountStatus) -> bool {
        use AccountStatus::*;
        matches!(
            (self, target),
            (Pending, Active) | (Pending, Rejected) | (Active, Blocked) | (Blocked, Active)
        )
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "rejected" => Ok(Self::Rejected),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Unknown account status: {}", s)),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub identity: Identity,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub role: AccountRole,
    pub status: AccountStatus,
    /// Client: what the consultations are about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Consultant: areas of expertise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competencies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Client: phone or e-mail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Whether this account may perform actions reserved for `role`.
    pub fn acts_as(&self, role: AccountRole) -> bool {
        self.role == role && self.is_active()
    }

    pub fn is_admin(&self) -> bool {
        self.role == AccountRole::Admin
    }

    /// `@handle` or a placeholder, for admin listings.
    pub fn handle(&self) -> String {
        match self.username.as_deref() {
            Some(u) if !u.is_empty() => format!("@{u}"),
            _ => "no username".to_string(),
        }
    }
}

/// Fields for inserting a new account.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub identity: Identity,
    pub full_name: String,
    pub username: Option<String>,
    pub role: AccountRole,
    pub status: AccountStatus,
    pub description: Option<String>,
    pub competencies: Option<String>,
    pub experience: Option<String>,
    pub timezone: Option<String>,
    pub contact: Option<String>,
}

impl NewAccount {
    fn blank(identity: Identity, full_name: String, username: Option<String>) -> Self {
        Self {
            identity,
            full_name,
            username,
            role: AccountRole::Guest,
            status: AccountStatus::Pending,
            description: None,
            competencies: None,
            experience: None,
            timezone: None,
            contact: None,
        }
    }

    /// A client awaiting admin approval.
    pub fn client(
        identity: Identity,
        username: Option<String>,
        full_name: String,
        description: Option<String>,
        contact: Option<String>,
    ) -> Self {
        Self {
            role: AccountRole::Client,
            description,
            contact,
            ..Self::blank(identity, full_name, username)
        }
    }

    /// A consultant awaiting admin approval.
    pub fn consultant(
        identity: Identity,
        username: Option<String>,
        full_name: String,
        competencies: String,
        experience: Option<String>,
        timezone: String,
    ) -> Self {
        Self {
            role: AccountRole::Consultant,
            competencies: Some(competencies),
            experience,
            timezone: Some(timezone),
            ..Self::blank(identity, full_name, username)
        }
    }

    /// An active admin created directly by the secret-phrase claim.
    pub fn admin(identity: Identity, username: Option<String>, full_name: String) -> Self {
        Self {
            role: AccountRole::Admin,
            status: AccountStatus::Active,
            ..Self::blank(identity, full_name, username)
        }
    }
}

/// Partial update for an account. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountPatch {
    pub role: Option<AccountRole>,
    pub status: Option<AccountStatus>,
}

impl AccountPatch {
    pub fn status(status: AccountStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn role(role: AccountRole) -> Self {
        Self {
            role: Some(role),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.status.is_none()
    }
}
