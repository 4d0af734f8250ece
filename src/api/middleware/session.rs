//! Wizard session middleware.
//!
//! Resolves the `drepadata_session` cookie to a `WizardSession`, creating
//! one on first touch, enforces the inactivity timeout and injects a
//! `SessionHandle` into request extensions for downstream handlers. The
//! cookie is re-issued on every response so its lifetime slides with the
//! server-side timeout.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionHandle};
use crate::config::SESSION_COOKIE;

/// Attach the caller's wizard session to the request.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// An expired session is dropped and answered with 401 and a cleared cookie.
pub async fn resolve_session(req: Request<Body>, next: Next) -> Response {
    match resolve_session_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn resolve_session_inner(
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let now = Instant::now();
    let secure = ctx.core.secure_cookies;
    let timeout = ctx.core.session_timeout();

    let existing = match cookie_value(req.headers(), SESSION_COOKIE) {
        Some(id) => ctx.core.find_session(&id)?.map(|session| SessionHandle { id, session }),
        None => None,
    };

    let handle = match existing {
        Some(handle) => {
            let expired = {
                let mut session = handle.lock()?;
                session.check_expiry(now).is_err()
            };
            if expired {
                ctx.core.remove_session(&handle.id)?;
                tracing::info!("Wizard session expired after inactivity");
                let mut response = ApiError::SessionExpired.into_response();
                append_cookie(&mut response, &clear_cookie(secure));
                return Ok(response);
            }
            handle
        }
        None => {
            ctx.core.prune_sessions(now)?;
            let (id, session) = ctx.core.create_session(now)?;
            tracing::debug!("Wizard session created");
            SessionHandle { id, session }
        }
    };

    let cookie = session_cookie(&handle.id, timeout, secure);
    req.extensions_mut().insert(handle);

    let mut response = next.run(req).await;
    append_cookie(&mut response, &cookie);
    Ok(response)
}

/// Value of a named cookie in the `Cookie` header(s).
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for a live session.
pub fn session_cookie(id: &str, timeout: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={id}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        timeout.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that deletes the session cookie.
pub fn clear_cookie(secure: bool) -> String {
    let mut cookie = format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Invalid session cookie header"),
    }
}
