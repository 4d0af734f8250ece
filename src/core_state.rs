//! Shared application state.
//!
//! `CoreState` is created once at startup, wrapped in `Arc` and shared by
//! every request. It owns the database location and the wizard session
//! store. The store sits behind an `RwLock`: lookups take the read lock,
//! only session creation and eviction take the write lock. No lock of the
//! store is held while a request touches storage.

use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::config;
use crate::db;
use crate::session_store::{SessionStore, SharedSession};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    /// SQLite database holding consultations.
    pub db_path: PathBuf,
    /// Whether the session cookie is marked `Secure`.
    pub secure_cookies: bool,
    sessions: RwLock<SessionStore>,
}

impl CoreState {
    /// Create a CoreState from the environment-driven configuration.
    pub fn new() -> Self {
        Self::with_settings(
            config::database_path(),
            config::session_timeout(),
            config::secure_cookies(),
        )
    }

    pub fn with_settings(db_path: PathBuf, session_timeout: Duration, secure_cookies: bool) -> Self {
        Self {
            db_path,
            secure_cookies,
            sessions: RwLock::new(SessionStore::new(session_timeout)),
        }
    }

    /// Open a database connection. Migrations run on every open.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    // ── Session store ───────────────────────────────────────

    pub fn read_sessions(&self) -> Result<RwLockReadGuard<'_, SessionStore>, CoreError> {
        self.sessions.read().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn write_sessions(&self) -> Result<RwLockWriteGuard<'_, SessionStore>, CoreError> {
        self.sessions.write().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn session_timeout(&self) -> Duration {
        self.sessions
            .read()
            .map(|store| store.timeout())
            .unwrap_or_else(|_| config::session_timeout())
    }

    /// Look up a session by cookie value.
    pub fn find_session(&self, id: &str) -> Result<Option<SharedSession>, CoreError> {
        Ok(self.read_sessions()?.get(id))
    }

    pub fn create_session(&self, now: Instant) -> Result<(String, SharedSession), CoreError> {
        Ok(self.write_sessions()?.create(now))
    }

    pub fn remove_session(&self, id: &str) -> Result<(), CoreError> {
        self.write_sessions()?.remove(id);
        Ok(())
    }

    /// Evict idle sessions. Returns how many were dropped.
    pub fn prune_sessions(&self, now: Instant) -> Result<usize, CoreError> {
        let pruned = self.write_sessions()?.prune_expired(now);
        if pruned > 0 {
            tracing::debug!(pruned, "Expired wizard sessions evicted");
        }
        Ok(pruned)
    }
}

impl Default for CoreState {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(dir: &tempfile::TempDir) -> CoreState {
        CoreState::with_settings(dir.path().join("drepadata.db"), Duration::from_secs(60), false)
    }

    #[test]
    fn open_db_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let conn = state.open_db().unwrap();
        assert!(db::count_tables(&conn).unwrap() >= 5);
        assert!(state.db_path.exists());
    }

    #[test]
    fn open_db_twice_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let id = db::insert_consultation(&state.open_db().unwrap()).unwrap();
        assert!(db::consultation_exists(&state.open_db().unwrap(), id).unwrap());
    }

    #[test]
    fn sessions_round_trip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let (id, _) = state.create_session(Instant::now()).unwrap();
        assert!(state.find_session(&id).unwrap().is_some());

        state.remove_session(&id).unwrap();
        assert!(state.find_session(&id).unwrap().is_none());
    }

    #[test]
    fn prune_uses_configured_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        assert_eq!(state.session_timeout(), Duration::from_secs(60));

        let start = Instant::now();
        state.create_session(start).unwrap();
        assert_eq!(state.prune_sessions(start + Duration::from_secs(30)).unwrap(), 0);
        assert_eq!(state.prune_sessions(start + Duration::from_secs(61)).unwrap(), 1);
    }
}
