//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identity TEXT NOT NULL UNIQUE,
                username TEXT,
                full_name TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'guest',
                status TEXT NOT NULL DEFAULT 'pending',
                description TEXT,
                competencies TEXT,
                experience TEXT,
                timezone TEXT,
                contact TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_role_status ON accounts(role, status);

            CREATE TABLE IF NOT EXISTS consultation_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER NOT NULL REFERENCES accounts(id),
                topic TEXT NOT NULL,
                preferred_time TEXT,
                details TEXT,
                status TEXT NOT NULL DEFAULT 'open',
                consultant_id INTEGER REFERENCES accounts(id),
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_requests_client ON consultation_requests(client_id);
            CREATE INDEX IF NOT EXISTS idx_requests_consultant ON consultation_requests(consultant_id);
            CREATE INDEX IF NOT EXISTS idx_requests_status ON consultation_requests(status);

            CREATE TABLE IF NOT EXISTS consultation_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id INTEGER NOT NULL REFERENCES consultation_requests(id),
                client_id INTEGER NOT NULL REFERENCES accounts(id),
                consultant_id INTEGER NOT NULL REFERENCES accounts(id),
                scheduled_at TEXT NOT NULL,
                topic TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'scheduled',
                client_confirmed INTEGER,
                consultant_confirmed INTEGER,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_client ON consultation_sessions(client_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_consultant ON consultation_sessions(consultant_id);

            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                registration_enabled INTEGER NOT NULL DEFAULT 1,
                consultations_enabled INTEGER NOT NULL DEFAULT 1
            );
        "#,
    },
    Migration {
        version: 2,
        name: "single_admin_and_session_per_request",
        sql: r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_single_admin
                ON accounts(role) WHERE role = 'admin';
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_request
                ON consultation_sessions(request_id);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::debug!(version, "Database migrations complete");

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
