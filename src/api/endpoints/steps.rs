//! Wizard step endpoints.
//!
//! Two endpoints:
//! - `POST /api/steps`: validate and persist one step
//! - `POST /api/steps/draft`: keep the in-progress form in the session

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::endpoints::session::MessageResponse;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionHandle};
use crate::intake::{workflow, Step};
use crate::models::{ConsultationId, FieldMap};

#[derive(Serialize)]
pub struct StepResponse {
    pub success: bool,
    pub consultation_id: ConsultationId,
    pub step: Step,
    pub message: &'static str,
}

/// `POST /api/steps`: `{current_step, csrf_token, consultation_id?, ...fields}`.
pub async fn save(
    State(ctx): State<ApiContext>,
    Extension(handle): Extension<SessionHandle>,
    payload: Result<Json<FieldMap>, JsonRejection>,
) -> Result<Json<StepResponse>, ApiError> {
    let Json(raw) = payload?;
    let mut conn = ctx.open_db()?;
    let mut session = handle.lock()?;

    let outcome = workflow::save_step(&mut conn, &mut session, &raw)?;

    Ok(Json(StepResponse {
        success: true,
        consultation_id: outcome.consultation_id,
        step: outcome.step,
        message: "Données sauvegardées avec succès",
    }))
}

/// `POST /api/steps/draft`: nothing is validated or stored.
pub async fn draft(
    Extension(handle): Extension<SessionHandle>,
    payload: Result<Json<FieldMap>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(raw) = payload?;
    let mut session = handle.lock()?;
    workflow::save_draft(&mut session, &raw)?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Session sauvegardée",
    }))
}
