//! Shared types for the intake API layer.

use std::sync::{Arc, MutexGuard};

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::intake::WizardSession;
use crate::session_store::SharedSession;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the intake router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }

    /// Open a database connection for one request.
    pub fn open_db(&self) -> Result<rusqlite::Connection, ApiError> {
        Ok(self.core.open_db()?)
    }
}

// ═══════════════════════════════════════════════════════════
// Session handle: injected by the session middleware
// ═══════════════════════════════════════════════════════════

/// The caller's wizard session, resolved from the session cookie and
/// already checked for expiry.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub session: SharedSession,
}

impl SessionHandle {
    /// Lock the session for the rest of the request.
    pub fn lock(&self) -> Result<MutexGuard<'_, WizardSession>, ApiError> {
        self.session
            .lock()
            .map_err(|_| ApiError::Internal("session lock poisoned".into()))
    }
}

// ═══════════════════════════════════════════════════════════
// Tokens
// ═══════════════════════════════════════════════════════════

/// Hash a token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random token (URL-safe base64, 32 bytes of entropy).
/// Used for session ids and CSRF tokens.
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
        // 32 bytes → 43 base64 characters without padding
        assert_eq!(t1.len(), 43);
    }

    #[test]
    fn generate_token_is_url_safe() {
        let token = generate_token();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("test"), hash_token("test"));
    }

    #[test]
    fn hash_token_differs_for_different_inputs() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }
}
