//! Session endpoints.
//!
//! Three endpoints:
//! - `GET /api/session`: CSRF token and wizard position
//! - `GET /api/session/resume`: prefill data for every saved step
//! - `POST /api/session/clear`: wipe the wizard state

use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::SessionHandle;
use crate::intake::session::body_token;
use crate::intake::{workflow, Step};
use crate::models::{ConsultationId, FieldMap};

/// Header carrying the CSRF token on requests without a JSON body.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

#[derive(Serialize)]
pub struct SessionResponse {
    pub csrf_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<ConsultationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<Step>,
}

/// `GET /api/session`: the session is created by the middleware on first touch.
pub async fn current(
    Extension(handle): Extension<SessionHandle>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = handle.lock()?;
    Ok(Json(SessionResponse {
        csrf_token: session.csrf_token().to_string(),
        consultation_id: session.consultation_id(),
        current_step: session.current_step(),
    }))
}

#[derive(Serialize)]
pub struct ResumeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<ConsultationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<Step>,
    pub prefill: FieldMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<FieldMap>,
}

/// `GET /api/session/resume`: union of the saved step snapshots.
pub async fn resume(
    Extension(handle): Extension<SessionHandle>,
) -> Result<Json<ResumeResponse>, ApiError> {
    let session = handle.lock()?;
    Ok(Json(ResumeResponse {
        success: true,
        consultation_id: session.consultation_id(),
        current_step: session.current_step(),
        prefill: session.resume(),
        draft: session.draft().cloned(),
    }))
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

/// `POST /api/session/clear`: CSRF token from the `X-CSRF-Token` header or
/// the JSON body. Stored consultations are not touched.
pub async fn clear(
    Extension(handle): Extension<SessionHandle>,
    headers: HeaderMap,
    body: Option<Json<FieldMap>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            body.as_ref()
                .and_then(|Json(raw)| body_token(raw))
                .map(str::to_string)
        });

    let mut session = handle.lock()?;
    workflow::clear_session(&mut session, token.as_deref())?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Session nettoyée avec succès",
    }))
}
