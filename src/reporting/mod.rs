//! Read-only reporting over the repository, served to the dashboard.
//!
//! Every call recomputes from current repository state.

pub mod routes;

pub use routes::reporting_routes;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    Account, AccountRole, AccountStatus, ConsultationRequest, ConsultationSession, RequestStatus,
    SessionStatus, Settings,
};
use crate::error::DatabaseError;
use crate::notify::LinkStatus;
use crate::store::Database;

/// Dashboard summary returned by `/api/stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub bot_running: bool,
    pub settings: Settings,
    pub users: AccountCounts,
    pub requests: RequestCounts,
    pub sessions: SessionCounts,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCounts {
    pub total_clients: usize,
    pub active_clients: usize,
    pub pending_clients: usize,
    pub total_consultants: usize,
    pub active_consultants: usize,
    pub pending_consultants: usize,
    pub has_admin: bool,
    /// Full role × status breakdown.
    pub by_role: BTreeMap<AccountRole, BTreeMap<AccountStatus, usize>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCounts {
    pub total: usize,
    pub open: usize,
    pub taken: usize,
    pub time_proposed: usize,
    pub scheduled: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounts {
    pub total: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub disagreement: usize,
    pub not_happened: usize,
    pub cancelled: usize,
}

/// Account fields safe to expose: no chat identity, no contact details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    pub id: i64,
    pub full_name: String,
    pub username: Option<String>,
    pub role: AccountRole,
    pub status: AccountStatus,
    pub competencies: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for PublicAccount {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            full_name: a.full_name,
            username: a.username,
            role: a.role,
            status: a.status,
            competencies: a.competencies,
            created_at: a.created_at,
        }
    }
}

impl AccountCounts {
    fn tally(accounts: &[Account]) -> Self {
        let mut counts = Self::default();
        for a in accounts {
            *counts
                .by_role
                .entry(a.role)
                .or_default()
                .entry(a.status)
                .or_default() += 1;

            match a.role {
                AccountRole::Client => {
                    counts.total_clients += 1;
                    counts.active_clients += usize::from(a.status == AccountStatus::Active);
                    counts.pending_clients += usize::from(a.status == AccountStatus::Pending);
                }
                AccountRole::Consultant => {
                    counts.total_consultants += 1;
                    counts.active_consultants += usize::from(a.status == AccountStatus::Active);
                    counts.pending_consultants += usize::from(a.status == AccountStatus::Pending);
                }
                AccountRole::Admin => counts.has_admin = true,
                AccountRole::Guest => {}
            }
        }
        counts
    }
}

impl RequestCounts {
    fn tally(requests: &[ConsultationRequest]) -> Self {
        let mut counts = Self {
            total: requests.len(),
            ..Default::default()
        };
        for r in requests {
            let slot = match r.status {
                RequestStatus::Open => &mut counts.open,
                RequestStatus::Taken => &mut counts.taken,
                RequestStatus::TimeProposed => &mut counts.time_proposed,
                RequestStatus::Scheduled => &mut counts.scheduled,
                RequestStatus::Cancelled => &mut counts.cancelled,
            };
            *slot += 1;
        }
        counts
    }
}

impl SessionCounts {
    fn tally(sessions: &[ConsultationSession]) -> Self {
        let mut counts = Self {
            total: sessions.len(),
            ..Default::default()
        };
        for s in sessions {
            let slot = match s.status {
                SessionStatus::Scheduled => &mut counts.scheduled,
                SessionStatus::Completed => &mut counts.completed,
                SessionStatus::Disagreement => &mut counts.disagreement,
                SessionStatus::NotHappened => &mut counts.not_happened,
                SessionStatus::Cancelled => &mut counts.cancelled,
            };
            *slot += 1;
        }
        counts
    }
}

/// Read-only view over the repository and the engine's link flag.
#[derive(Clone)]
pub struct Reporter {
    db: Arc<dyn Database>,
    link: LinkStatus,
}

impl Reporter {
    pub fn new(db: Arc<dyn Database>, link: LinkStatus) -> Self {
        Self { db, link }
    }

    pub async fn summary(&self) -> Result<Summary, DatabaseError> {
        let accounts = self.db.list_accounts().await?;
        let requests = self.db.list_requests().await?;
        let sessions = self.db.list_sessions().await?;
        let settings = self.db.get_settings().await?;

        Ok(Summary {
            bot_running: self.link.is_running(),
            settings,
            users: AccountCounts::tally(&accounts),
            requests: RequestCounts::tally(&requests),
            sessions: SessionCounts::tally(&sessions),
        })
    }

    pub async fn accounts(&self) -> Result<Vec<PublicAccount>, DatabaseError> {
        let accounts = self.db.list_accounts().await?;
        Ok(accounts.into_iter().map(PublicAccount::from).collect())
    }

    pub async fn requests(&self) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.db.list_requests().await
    }

    pub async fn sessions(&self) -> Result<Vec<ConsultationSession>, DatabaseError> {
        self.db.list_sessions().await
    }
}
