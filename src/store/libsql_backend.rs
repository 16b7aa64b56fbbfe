//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Every lifecycle write is a
//! conditional statement with `RETURNING`, so a write that loses a race comes
//! back as `None` instead of clobbering the winner. Scheduling and reset span
//! several statements and run inside one transaction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{
    Account, AccountPatch, AccountRole, AccountStatus, ConsultationRequest, ConsultationSession,
    Identity, NewAccount, NewRequest, NewSession, Party, RequestPatch, RequestStatus,
    SessionStatus, Settings, SettingsPatch,
};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    /// The connection is shared, so only one transaction may be open at a time.
    tx_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            tx_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            tx_lock: Mutex::new(()),
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run a query and map every returned row with `map`.
    async fn query_all<T>(
        &self,
        op: &str,
        sql: &str,
        values: Vec<Value>,
        map: fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params::Params::Positional(values))
            .await
            .map_err(|e| query_error(op, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| query_error(op, e))? {
            out.push(map(&row)?);
        }
        Ok(out)
    }

    /// Run a query and map the first returned row, if any.
    async fn query_opt<T>(
        &self,
        op: &str,
        sql: &str,
        values: Vec<Value>,
        map: fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<Option<T>, DatabaseError> {
        fetch_opt(self.conn(), op, sql, values, map).await
    }

    /// Like `query_opt`, but a missing row is an error.
    async fn query_one<T>(
        &self,
        op: &str,
        sql: &str,
        values: Vec<Value>,
        map: fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        self.query_opt(op, sql, values, map)
            .await?
            .ok_or_else(|| DatabaseError::Query(format!("{op}: no row returned")))
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Run a query on `conn` and map the first returned row, if any.
async fn fetch_opt<T>(
    conn: &Connection,
    op: &str,
    sql: &str,
    values: Vec<Value>,
    map: fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Option<T>, DatabaseError> {
    let mut rows = conn
        .query(sql, params::Params::Positional(values))
        .await
        .map_err(|e| query_error(op, e))?;

    match rows.next().await.map_err(|e| query_error(op, e))? {
        Some(row) => Ok(Some(map(&row)?)),
        None => Ok(None),
    }
}

/// Map a libsql error, surfacing constraint violations separately.
fn query_error(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

fn row_error(op: &str, e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Query(format!("{op} row parse: {e}"))
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

fn opt_int(v: Option<i64>) -> Value {
    match v {
        Some(v) => Value::Integer(v),
        None => Value::Null,
    }
}

fn opt_bool(v: Option<bool>) -> Value {
    opt_int(v.map(i64::from))
}

fn get_text(row: &libsql::Row, idx: i32) -> Result<Option<String>, libsql::Error> {
    match row.get_value(idx)? {
        Value::Text(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn get_int(row: &libsql::Row, idx: i32) -> Result<Option<i64>, libsql::Error> {
    match row.get_value(idx)? {
        Value::Integer(v) => Ok(Some(v)),
        _ => Ok(None),
    }
}

fn get_bool(row: &libsql::Row, idx: i32) -> Result<Option<bool>, libsql::Error> {
    Ok(get_int(row, idx)?.map(|v| v != 0))
}

const ACCOUNT_COLUMNS: &str = "id, identity, username, full_name, role, status, description, competencies, experience, timezone, contact, created_at";

const REQUEST_COLUMNS: &str =
    "id, client_id, topic, preferred_time, details, status, consultant_id, created_at";

/// Tables cleared by `reset_all`, children before parents.
const RESET_ORDER: [&str; 4] = [
    "consultation_sessions",
    "consultation_requests",
    "accounts",
    "settings",
];

const SESSION_COLUMNS: &str = "id, request_id, client_id, consultant_id, scheduled_at, topic, status, client_confirmed, consultant_confirmed, created_at";

/// Map a libsql Row to an Account.
fn row_to_account(row: &libsql::Row) -> Result<Account, DatabaseError> {
    let op = "account";
    let role: String = row.get(4).map_err(|e| row_error(op, e))?;
    let status: String = row.get(5).map_err(|e| row_error(op, e))?;
    let created: String = row.get(11).map_err(|e| row_error(op, e))?;

    Ok(Account {
        id: row.get(0).map_err(|e| row_error(op, e))?,
        identity: Identity::new(row.get::<String>(1).map_err(|e| row_error(op, e))?),
        username: get_text(row, 2).map_err(|e| row_error(op, e))?,
        full_name: row.get(3).map_err(|e| row_error(op, e))?,
        role: role.parse().map_err(|e: String| row_error(op, e))?,
        status: status.parse().map_err(|e: String| row_error(op, e))?,
        description: get_text(row, 6).map_err(|e| row_error(op, e))?,
        competencies: get_text(row, 7).map_err(|e| row_error(op, e))?,
        experience: get_text(row, 8).map_err(|e| row_error(op, e))?,
        timezone: get_text(row, 9).map_err(|e| row_error(op, e))?,
        contact: get_text(row, 10).map_err(|e| row_error(op, e))?,
        created_at: parse_datetime(&created),
    })
}

/// Map a libsql Row to a ConsultationRequest.
fn row_to_request(row: &libsql::Row) -> Result<ConsultationRequest, DatabaseError> {
    let op = "request";
    let status: String = row.get(5).map_err(|e| row_error(op, e))?;
    let created: String = row.get(7).map_err(|e| row_error(op, e))?;

    Ok(ConsultationRequest {
        id: row.get(0).map_err(|e| row_error(op, e))?,
        client_id: row.get(1).map_err(|e| row_error(op, e))?,
        topic: row.get(2).map_err(|e| row_error(op, e))?,
        preferred_time: get_text(row, 3).map_err(|e| row_error(op, e))?,
        details: get_text(row, 4).map_err(|e| row_error(op, e))?,
        status: status.parse().map_err(|e: String| row_error(op, e))?,
        consultant_id: get_int(row, 6).map_err(|e| row_error(op, e))?,
        created_at: parse_datetime(&created),
    })
}

/// Map a libsql Row to a ConsultationSession.
fn row_to_session(row: &libsql::Row) -> Result<ConsultationSession, DatabaseError> {
    let op = "session";
    let status: String = row.get(6).map_err(|e| row_error(op, e))?;
    let created: String = row.get(9).map_err(|e| row_error(op, e))?;

    Ok(ConsultationSession {
        id: row.get(0).map_err(|e| row_error(op, e))?,
        request_id: row.get(1).map_err(|e| row_error(op, e))?,
        client_id: row.get(2).map_err(|e| row_error(op, e))?,
        consultant_id: row.get(3).map_err(|e| row_error(op, e))?,
        scheduled_at: row.get(4).map_err(|e| row_error(op, e))?,
        topic: row.get(5).map_err(|e| row_error(op, e))?,
        status: status.parse().map_err(|e: String| row_error(op, e))?,
        client_confirmed: get_bool(row, 7).map_err(|e| row_error(op, e))?,
        consultant_confirmed: get_bool(row, 8).map_err(|e| row_error(op, e))?,
        created_at: parse_datetime(&created),
    })
}

fn row_to_settings(row: &libsql::Row) -> Result<Settings, DatabaseError> {
    let op = "settings";
    Ok(Settings {
        registration_enabled: get_bool(row, 0).map_err(|e| row_error(op, e))?.unwrap_or(true),
        consultations_enabled: get_bool(row, 1).map_err(|e| row_error(op, e))?.unwrap_or(true),
    })
}

/// Values for the account insert, in `ACCOUNT_COLUMNS` order minus `id`.
fn account_values(account: &NewAccount) -> Vec<Value> {
    vec![
        Value::Text(account.identity.as_str().to_string()),
        opt_text(account.username.as_deref()),
        Value::Text(account.full_name.clone()),
        Value::Text(account.role.as_str().to_string()),
        Value::Text(account.status.as_str().to_string()),
        opt_text(account.description.as_deref()),
        opt_text(account.competencies.as_deref()),
        opt_text(account.experience.as_deref()),
        opt_text(account.timezone.as_deref()),
        opt_text(account.contact.as_deref()),
        Value::Text(Utc::now().to_rfc3339()),
    ]
}

/// SET fragments and their values for a request patch. Placeholders start at `?1`.
fn request_assignments(patch: &RequestPatch) -> (Vec<String>, Vec<Value>) {
    let mut sets = Vec::new();
    let mut values = Vec::new();
    if let Some(status) = patch.status {
        values.push(Value::Text(status.as_str().to_string()));
        sets.push(format!("status = ?{}", values.len()));
    }
    if let Some(consultant_id) = patch.consultant_id {
        values.push(opt_int(consultant_id));
        sets.push(format!("consultant_id = ?{}", values.len()));
    }
    if let Some(preferred_time) = &patch.preferred_time {
        values.push(opt_text(preferred_time.as_deref()));
        sets.push(format!("preferred_time = ?{}", values.len()));
    }
    (sets, values)
}

/// `UPDATE ... WHERE id = ? AND status = ?` for `patch`, or a plain guarded
/// `SELECT` when the patch is empty.
fn conditional_request_update(
    id: i64,
    expected: RequestStatus,
    patch: &RequestPatch,
) -> (String, Vec<Value>) {
    let (sets, mut values) = request_assignments(patch);
    values.push(Value::Integer(id));
    let id_idx = values.len();
    values.push(Value::Text(expected.as_str().to_string()));
    let status_idx = values.len();

    let sql = if sets.is_empty() {
        format!(
            "SELECT {REQUEST_COLUMNS} FROM consultation_requests WHERE id = ?{id_idx} AND status = ?{status_idx}"
        )
    } else {
        format!(
            "UPDATE consultation_requests SET {} WHERE id = ?{id_idx} AND status = ?{status_idx} RETURNING {REQUEST_COLUMNS}",
            sets.join(", ")
        )
    };
    (sql, values)
}

/// Conditional request update followed by the session insert, on one
/// connection. The caller owns the surrounding transaction.
async fn schedule_on(
    conn: &Connection,
    id: i64,
    expected: RequestStatus,
    patch: &RequestPatch,
    session: &NewSession,
) -> Result<Option<(ConsultationRequest, ConsultationSession)>, DatabaseError> {
    let (sql, values) = conditional_request_update(id, expected, patch);
    let Some(request) = fetch_opt(conn, "schedule_request", &sql, values, row_to_request).await?
    else {
        return Ok(None);
    };

    let created = fetch_opt(
        conn,
        "schedule_request",
        &format!(
            "INSERT INTO consultation_sessions (request_id, client_id, consultant_id, scheduled_at, topic, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'scheduled', ?6)
             RETURNING {SESSION_COLUMNS}"
        ),
        vec![
            Value::Integer(session.request_id),
            Value::Integer(session.client_id),
            Value::Integer(session.consultant_id),
            Value::Text(session.scheduled_at.clone()),
            Value::Text(session.topic.clone()),
            Value::Text(Utc::now().to_rfc3339()),
        ],
        row_to_session,
    )
    .await?
    .ok_or_else(|| DatabaseError::Query("schedule_request: no session row returned".into()))?;

    Ok(Some((request, created)))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Accounts ────────────────────────────────────────────────────

    async fn create_account(&self, account: &NewAccount) -> Result<Account, DatabaseError> {
        let created = self
            .query_one(
                "create_account",
                &format!(
                    "INSERT INTO accounts (identity, username, full_name, role, status, description, competencies, experience, timezone, contact, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     RETURNING {ACCOUNT_COLUMNS}"
                ),
                account_values(account),
                row_to_account,
            )
            .await?;

        debug!(account_id = created.id, role = %created.role, "Account inserted into DB");
        Ok(created)
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>, DatabaseError> {
        self.query_opt(
            "get_account",
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            vec![Value::Integer(id)],
            row_to_account,
        )
        .await
    }

    async fn get_account_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<Account>, DatabaseError> {
        self.query_opt(
            "get_account_by_identity",
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE identity = ?1"),
            vec![Value::Text(identity.as_str().to_string())],
            row_to_account,
        )
        .await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, DatabaseError> {
        self.query_all(
            "list_accounts",
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id ASC"),
            vec![],
            row_to_account,
        )
        .await
    }

    async fn list_accounts_by_role(
        &self,
        role: AccountRole,
    ) -> Result<Vec<Account>, DatabaseError> {
        self.query_all(
            "list_accounts_by_role",
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE role = ?1 ORDER BY id ASC"),
            vec![Value::Text(role.as_str().to_string())],
            row_to_account,
        )
        .await
    }

    async fn list_accounts_by_role_and_status(
        &self,
        role: AccountRole,
        status: AccountStatus,
    ) -> Result<Vec<Account>, DatabaseError> {
        self.query_all(
            "list_accounts_by_role_and_status",
            &format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE role = ?1 AND status = ?2 ORDER BY id ASC"
            ),
            vec![
                Value::Text(role.as_str().to_string()),
                Value::Text(status.as_str().to_string()),
            ],
            row_to_account,
        )
        .await
    }

    async fn update_account(
        &self,
        id: i64,
        patch: &AccountPatch,
    ) -> Result<Option<Account>, DatabaseError> {
        if patch.is_empty() {
            return self.get_account(id).await;
        }
        let updated = self
            .query_opt(
                "update_account",
                &format!(
                    "UPDATE accounts SET role = COALESCE(?1, role), status = COALESCE(?2, status)
                     WHERE id = ?3
                     RETURNING {ACCOUNT_COLUMNS}"
                ),
                vec![
                    opt_text(patch.role.map(|r| r.as_str())),
                    opt_text(patch.status.map(|s| s.as_str())),
                    Value::Integer(id),
                ],
                row_to_account,
            )
            .await?;

        debug!(account_id = id, ?patch, updated = updated.is_some(), "Account updated in DB");
        Ok(updated)
    }

    async fn get_admin(&self) -> Result<Option<Account>, DatabaseError> {
        self.query_opt(
            "get_admin",
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE role = 'admin' LIMIT 1"),
            vec![],
            row_to_account,
        )
        .await
    }

    async fn claim_admin(&self, account_id: i64) -> Result<Option<Account>, DatabaseError> {
        let claimed = self
            .query_opt(
                "claim_admin",
                &format!(
                    "UPDATE accounts SET role = 'admin', status = 'active'
                     WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM accounts WHERE role = 'admin')
                     RETURNING {ACCOUNT_COLUMNS}"
                ),
                vec![Value::Integer(account_id)],
                row_to_account,
            )
            .await;

        match claimed {
            Err(DatabaseError::Constraint(_)) => Ok(None),
            other => other,
        }
    }

    async fn create_admin(&self, account: &NewAccount) -> Result<Option<Account>, DatabaseError> {
        let mut new = account.clone();
        new.role = AccountRole::Admin;
        new.status = AccountStatus::Active;

        let created = self
            .query_opt(
                "create_admin",
                &format!(
                    "INSERT INTO accounts (identity, username, full_name, role, status, description, competencies, experience, timezone, contact, created_at)
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
                     WHERE NOT EXISTS (SELECT 1 FROM accounts WHERE role = 'admin')
                     RETURNING {ACCOUNT_COLUMNS}"
                ),
                account_values(&new),
                row_to_account,
            )
            .await?;

        if let Some(admin) = &created {
            info!(account_id = admin.id, "Admin account created");
        }
        Ok(created)
    }

    // ── Requests ────────────────────────────────────────────────────

    async fn create_request(
        &self,
        request: &NewRequest,
    ) -> Result<ConsultationRequest, DatabaseError> {
        let created = self
            .query_one(
                "create_request",
                &format!(
                    "INSERT INTO consultation_requests (client_id, topic, preferred_time, details, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, 'open', ?5)
                     RETURNING {REQUEST_COLUMNS}"
                ),
                vec![
                    Value::Integer(request.client_id),
                    Value::Text(request.topic.clone()),
                    opt_text(request.preferred_time.as_deref()),
                    opt_text(request.details.as_deref()),
                    Value::Text(Utc::now().to_rfc3339()),
                ],
                row_to_request,
            )
            .await?;

        debug!(request_id = created.id, client_id = created.client_id, "Request inserted into DB");
        Ok(created)
    }

    async fn get_request(&self, id: i64) -> Result<Option<ConsultationRequest>, DatabaseError> {
        self.query_opt(
            "get_request",
            &format!("SELECT {REQUEST_COLUMNS} FROM consultation_requests WHERE id = ?1"),
            vec![Value::Integer(id)],
            row_to_request,
        )
        .await
    }

    async fn list_requests(&self) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.query_all(
            "list_requests",
            &format!("SELECT {REQUEST_COLUMNS} FROM consultation_requests ORDER BY id DESC"),
            vec![],
            row_to_request,
        )
        .await
    }

    async fn list_requests_by_client(
        &self,
        client_id: i64,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.query_all(
            "list_requests_by_client",
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM consultation_requests WHERE client_id = ?1 ORDER BY id DESC"
            ),
            vec![Value::Integer(client_id)],
            row_to_request,
        )
        .await
    }

    async fn list_requests_by_consultant(
        &self,
        consultant_id: i64,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.query_all(
            "list_requests_by_consultant",
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM consultation_requests WHERE consultant_id = ?1 ORDER BY id DESC"
            ),
            vec![Value::Integer(consultant_id)],
            row_to_request,
        )
        .await
    }

    async fn list_requests_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ConsultationRequest>, DatabaseError> {
        self.query_all(
            "list_requests_by_status",
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM consultation_requests WHERE status = ?1 ORDER BY id DESC"
            ),
            vec![Value::Text(status.as_str().to_string())],
            row_to_request,
        )
        .await
    }

    async fn update_request_if(
        &self,
        id: i64,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<Option<ConsultationRequest>, DatabaseError> {
        let (sql, values) = conditional_request_update(id, expected, patch);
        let updated = self
            .query_opt("update_request_if", &sql, values, row_to_request)
            .await?;

        debug!(
            request_id = id,
            expected = %expected,
            applied = updated.is_some(),
            "Conditional request update"
        );
        Ok(updated)
    }

    async fn schedule_request(
        &self,
        id: i64,
        expected: RequestStatus,
        patch: &RequestPatch,
        session: &NewSession,
    ) -> Result<Option<(ConsultationRequest, ConsultationSession)>, DatabaseError> {
        let _guard = self.tx_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| query_error("schedule_request begin", e))?;

        match schedule_on(&tx, id, expected, patch, session).await {
            Ok(Some(scheduled)) => {
                tx.commit()
                    .await
                    .map_err(|e| query_error("schedule_request commit", e))?;
                debug!(
                    request_id = id,
                    session_id = scheduled.1.id,
                    "Request scheduled with session"
                );
                Ok(Some(scheduled))
            }
            Ok(None) => {
                tx.rollback()
                    .await
                    .map_err(|e| query_error("schedule_request rollback", e))?;
                Ok(None)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(request_id = id, "Rollback after failed scheduling failed: {rb}");
                }
                Err(e)
            }
        }
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn get_session(&self, id: i64) -> Result<Option<ConsultationSession>, DatabaseError> {
        self.query_opt(
            "get_session",
            &format!("SELECT {SESSION_COLUMNS} FROM consultation_sessions WHERE id = ?1"),
            vec![Value::Integer(id)],
            row_to_session,
        )
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<ConsultationSession>, DatabaseError> {
        self.query_all(
            "list_sessions",
            &format!("SELECT {SESSION_COLUMNS} FROM consultation_sessions ORDER BY id DESC"),
            vec![],
            row_to_session,
        )
        .await
    }

    async fn list_sessions_by_client(
        &self,
        client_id: i64,
    ) -> Result<Vec<ConsultationSession>, DatabaseError> {
        self.query_all(
            "list_sessions_by_client",
            &format!(
                "SELECT {SESSION_COLUMNS} FROM consultation_sessions WHERE client_id = ?1 ORDER BY id DESC"
            ),
            vec![Value::Integer(client_id)],
            row_to_session,
        )
        .await
    }

    async fn list_sessions_by_consultant(
        &self,
        consultant_id: i64,
    ) -> Result<Vec<ConsultationSession>, DatabaseError> {
        self.query_all(
            "list_sessions_by_consultant",
            &format!(
                "SELECT {SESSION_COLUMNS} FROM consultation_sessions WHERE consultant_id = ?1 ORDER BY id DESC"
            ),
            vec![Value::Integer(consultant_id)],
            row_to_session,
        )
        .await
    }

    async fn set_session_confirmation(
        &self,
        id: i64,
        party: Party,
        happened: bool,
    ) -> Result<Option<ConsultationSession>, DatabaseError> {
        let column = match party {
            Party::Client => "client_confirmed",
            Party::Consultant => "consultant_confirmed",
        };
        self.query_opt(
            "set_session_confirmation",
            &format!(
                "UPDATE consultation_sessions SET {column} = ?1
                 WHERE id = ?2 AND status = 'scheduled'
                 RETURNING {SESSION_COLUMNS}"
            ),
            vec![opt_bool(Some(happened)), Value::Integer(id)],
            row_to_session,
        )
        .await
    }

    async fn update_session_status_if(
        &self,
        id: i64,
        expected: SessionStatus,
        status: SessionStatus,
    ) -> Result<Option<ConsultationSession>, DatabaseError> {
        let updated = self
            .query_opt(
                "update_session_status_if",
                &format!(
                    "UPDATE consultation_sessions SET status = ?1
                     WHERE id = ?2 AND status = ?3
                     RETURNING {SESSION_COLUMNS}"
                ),
                vec![
                    Value::Text(status.as_str().to_string()),
                    Value::Integer(id),
                    Value::Text(expected.as_str().to_string()),
                ],
                row_to_session,
            )
            .await?;

        debug!(session_id = id, %status, applied = updated.is_some(), "Conditional session update");
        Ok(updated)
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_settings(&self) -> Result<Settings, DatabaseError> {
        self.conn()
            .execute("INSERT OR IGNORE INTO settings (id) VALUES (1)", ())
            .await
            .map_err(|e| query_error("get_settings", e))?;

        self.query_one(
            "get_settings",
            "SELECT registration_enabled, consultations_enabled FROM settings WHERE id = 1",
            vec![],
            row_to_settings,
        )
        .await
    }

    async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, DatabaseError> {
        self.conn()
            .execute("INSERT OR IGNORE INTO settings (id) VALUES (1)", ())
            .await
            .map_err(|e| query_error("update_settings", e))?;

        let updated = self
            .query_one(
                "update_settings",
                "UPDATE settings SET
                    registration_enabled = COALESCE(?1, registration_enabled),
                    consultations_enabled = COALESCE(?2, consultations_enabled)
                 WHERE id = 1
                 RETURNING registration_enabled, consultations_enabled",
                vec![
                    opt_bool(patch.registration_enabled),
                    opt_bool(patch.consultations_enabled),
                ],
                row_to_settings,
            )
            .await?;

        info!(
            registration_enabled = updated.registration_enabled,
            consultations_enabled = updated.consultations_enabled,
            "Settings updated"
        );
        Ok(updated)
    }

    async fn reset_all(&self) -> Result<(), DatabaseError> {
        let _guard = self.tx_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| query_error("reset_all begin", e))?;

        for table in RESET_ORDER {
            if let Err(e) = tx.execute(&format!("DELETE FROM {table}"), ()).await {
                if let Err(rb) = tx.rollback().await {
                    warn!("Rollback after failed reset failed: {rb}");
                }
                return Err(query_error("reset_all", e));
            }
        }
        tx.commit()
            .await
            .map_err(|e| query_error("reset_all commit", e))?;

        info!("All accounts, requests, sessions, and settings deleted");
        Ok(())
    }
}
