//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;

use crate::domain::{
    Account, AccountPatch, AccountRole, AccountStatus, ConsultationRequest, ConsultationSession,
    Identity, NewAccount, NewRequest, NewSession, Party, RequestPatch, RequestStatus,
    SessionStatus, Settings, SettingsPatch,
};
use crate::error::DatabaseError;

/// Backend-agnostic repository covering accounts, requests, sessions, and
/// settings.
///
/// Updates return the post-update record, or `None` when the row does not
/// exist or is no longer in the expected state.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Accounts ────────────────────────────────────────────────────

    /// Insert a new account. Fails with `Constraint` if the identity is taken.
    async fn create_account(&self, account: &NewAccount) -> Result<Account, DatabaseError>;

    async fn get_account(&self, id: i64) -> Result<Option<Account>, DatabaseError>;

    async fn get_account_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<Account>, DatabaseError>;

    /// All accounts, oldest first.
    async fn list_accounts(&self) -> Result<Vec<Account>, DatabaseError>;

    async fn list_accounts_by_role(&self, role: AccountRole)
    -> Result<Vec<Account>, DatabaseError>;

    async fn list_accounts_by_role_and_status(
        &self,
        role: AccountRole,
        status: AccountStatus,
    ) -> Result<Vec<Account>, DatabaseError>;

    async fn update_account(
        &self,
        id: i64,
        patch: &AccountPatch,
    ) -> Result<Option<Account>, DatabaseError>;

    /// The single admin account, if one has been claimed.
    async fn get_admin(&self) -> Result<Option<Account>, DatabaseError>;

    /// Promote an existing account to active admin, only if no admin exists.
    async fn claim_admin(&self, account_id: i64) -> Result<Option<Account>, DatabaseError>;

    /// Insert a fresh admin account, only if no admin exists.
    async fn create_admin(&self, account: &NewAccount) -> Result<Option<Account>, DatabaseError>;

    // ── Requests ────────────────────────────────────────────────────

    async fn create_request(
        &self,
        request: &NewRequest,
    ) -> Result<ConsultationRequest, DatabaseError>;

    async fn get_request(&self, id: i64) -> Result<Option<ConsultationRequest>, DatabaseError>;

    /// All requests, newest first.
    async fn list_requests(&self) -> Result<Vec<ConsultationRequest>, DatabaseError>;

    async fn list_requests_by_client(
        &self,
        client_id: i64,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError>;

    async fn list_requests_by_consultant(
        &self,
        consultant_id: i64,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError>;

    async fn list_requests_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError>;

    /// Apply `patch` only while the request is still in `expected` status.
    async fn update_request_if(
        &self,
        id: i64,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<ConsultationRequest>, DatabaseError>;

    /// Apply `patch` while the request is still in `expected` status and
    /// insert its session, atomically. `None` when the request moved on;
    /// on any error neither write is kept.
    async fn schedule_request(
        &self,
        id: i64,
        expected: RequestStatus,
        patch: &RequestPatch,
        session: &NewSession,
    ) -> Result<Option<(ConsultationRequest, ConsultationSession)>, DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    async fn get_session(&self, id: i64) -> Result<Option<ConsultationSession>, DatabaseError>;

    /// All sessions, newest first.
    async fn list_sessions(&self) -> Result<Vec<ConsultationSession>, DatabaseError>;

    async fn list_sessions_by_client(
        &self,
        client_id: i64,
    ) -> Result<Vec<ConsultationSession>, DatabaseError>;

    async fn list_sessions_by_consultant(
        &self,
        consultant_id: i64,
    ) -> Result<Vec<ConsultationSession>, DatabaseError>;

    /// Record one party's answer while the session is still `scheduled`.
    async fn set_session_confirmation(
        &self,
        id: i64,
        party: Party,
        happened: bool,
    ) -> Result<Option<ConsultationSession>, DatabaseError>;

    async fn update_session_status_if(
        &self,
        id: i64,
        expected: SessionStatus,
        status: SessionStatus,
    ) -> Result<Option<ConsultationSession>, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Current settings, inserting the default row on first read.
    async fn get_settings(&self) -> Result<Settings, DatabaseError>;

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, DatabaseError>;

    /// Delete every account, request, session, and the settings row.
    async fn reset_all(&self) -> Result<(), DatabaseError>;
}
