//! In-memory store of wizard sessions, keyed by session cookie.
//!
//! Key properties:
//! - Sessions live only in memory; a restart starts every browser afresh
//! - Each session sits behind its own mutex, so two browsers never contend
//! - Expired sessions are dropped on access and by `prune_expired`

use std::collections::HashMap;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use crate::api::types::generate_token;
use crate::intake::WizardSession;

/// Shared handle to one wizard session.
pub type SharedSession = Arc<Mutex<WizardSession>>;

// ═══════════════════════════════════════════════════════════
// SessionStore
// ═══════════════════════════════════════════════════════════

pub struct SessionStore {
    sessions: HashMap<String, SharedSession>,
    timeout: Duration,
}

impl SessionStore {
    /// Create an empty store whose sessions expire after `timeout` of inactivity.
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    // ── Lookup ───────────────────────────────────────────

    /// Start a new session. Returns its cookie value and handle.
    pub fn create(&mut self, now: Instant) -> (String, SharedSession) {
        let id = generate_token();
        let session = Arc::new(Mutex::new(WizardSession::new(self.timeout, now)));
        self.sessions.insert(id.clone(), Arc::clone(&session));
        (id, session)
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    // ── Eviction ─────────────────────────────────────────

    pub fn remove(&mut self, id: &str) {
        self.sessions.remove(id);
    }

    /// Drop every session idle for longer than the timeout. Sessions locked
    /// by an in-flight request are kept; poisoned ones are dropped.
    pub fn prune_expired(&mut self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| match session.try_lock() {
            Ok(guard) => !guard.is_expired(now),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        });
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::Step;
    use crate::models::{ConsultationId, FieldMap};

    const TIMEOUT: Duration = Duration::from_secs(1800);

    #[test]
    fn new_store_is_empty() {
        let store = SessionStore::new(TIMEOUT);
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.timeout(), TIMEOUT);
    }

    #[test]
    fn create_issues_distinct_ids() {
        let mut store = SessionStore::new(TIMEOUT);
        let now = Instant::now();
        let (a, _) = store.create(now);
        let (b, _) = store.create(now);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert!(store.contains(&a));
    }

    #[test]
    fn get_returns_same_session() {
        let mut store = SessionStore::new(TIMEOUT);
        let (id, created) = store.create(Instant::now());
        created
            .lock()
            .unwrap()
            .record_step(Step::Administrative, ConsultationId(8), FieldMap::new());

        let fetched = store.get(&id).unwrap();
        assert_eq!(fetched.lock().unwrap().consultation_id(), Some(ConsultationId(8)));
        assert!(store.get("unknown").is_none());
    }

    #[test]
    fn sessions_do_not_share_state() {
        let mut store = SessionStore::new(TIMEOUT);
        let now = Instant::now();
        let (_, first) = store.create(now);
        let (_, second) = store.create(now);
        first
            .lock()
            .unwrap()
            .record_step(Step::Comments, ConsultationId(1), FieldMap::new());
        assert_eq!(second.lock().unwrap().consultation_id(), None);
        assert_ne!(
            first.lock().unwrap().csrf_token(),
            second.lock().unwrap().csrf_token()
        );
    }

    #[test]
    fn remove_drops_session() {
        let mut store = SessionStore::new(TIMEOUT);
        let (id, _) = store.create(Instant::now());
        store.remove(&id);
        assert!(store.is_empty());
        store.remove(&id);
    }

    #[test]
    fn prune_removes_idle_sessions_only() {
        let mut store = SessionStore::new(TIMEOUT);
        let start = Instant::now();
        let (idle, _) = store.create(start);
        let (active, handle) = store.create(start);

        let later = start + Duration::from_secs(1000);
        handle.lock().unwrap().check_expiry(later).unwrap();

        let pruned = store.prune_expired(start + Duration::from_secs(1900));
        assert_eq!(pruned, 1);
        assert!(!store.contains(&idle));
        assert!(store.contains(&active));
    }

    #[test]
    fn prune_keeps_sessions_in_use() {
        let mut store = SessionStore::new(TIMEOUT);
        let start = Instant::now();
        let (id, handle) = store.create(start);
        let _guard = handle.lock().unwrap();
        assert_eq!(store.prune_expired(start + Duration::from_secs(4000)), 0);
        assert!(store.contains(&id));
    }
}
