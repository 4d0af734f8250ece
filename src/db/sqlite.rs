//! Connection setup and schema migrations for the consultation store.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;

/// One versioned schema change, applied at most once.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Every schema change, in version order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "consultation intake",
    sql: include_str!("../../resources/migrations/001_initial.sql"),
}];

/// Open the consultation store at `path`, creating its directory when
/// missing, and bring the schema up to date.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DatabaseError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    prepare(Connection::open(path)?)
}

/// In-memory store with the full schema (tests).
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection, DatabaseError> {
    // Concurrent step saves wait on the IMMEDIATE lock instead of failing.
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Apply every migration newer than the recorded schema version.
///
/// Each migration runs in its own transaction together with its
/// `schema_version` row, so a failed migration leaves no trace.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY,
             applied_at TEXT NOT NULL DEFAULT (datetime('now'))
         );",
    )?;
    let current = schema_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::info!(version = migration.version, name = migration.name, "Applying migration");
        apply(conn, migration).map_err(|e| DatabaseError::MigrationFailed {
            version: migration.version,
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![migration.version],
    )?;
    tx.commit()
}

/// Highest applied migration; 0 on a store that has none yet.
pub fn schema_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let table: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if table.is_none() {
        return Ok(0);
    }
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

/// Number of user tables.
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?)
}
