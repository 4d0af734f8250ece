//! Vaccination calendar endpoints.
//!
//! Two endpoints:
//! - `GET /api/vaccinations`: current checklist (session, then storage)
//! - `POST /api/vaccinations`: save the checklist

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionHandle};
use crate::intake::workflow;
use crate::models::{ConsultationId, FieldMap, VaccinationChecklist};

#[derive(Deserialize)]
pub struct ChecklistQuery {
    pub consultation_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChecklistResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<ConsultationId>,
    pub vaccines: VaccinationChecklist,
}

/// `GET /api/vaccinations`: an empty checklist when nothing was saved yet.
pub async fn current(
    State(ctx): State<ApiContext>,
    Extension(handle): Extension<SessionHandle>,
    Query(query): Query<ChecklistQuery>,
) -> Result<Json<ChecklistResponse>, ApiError> {
    let requested = query
        .consultation_id
        .and_then(|id| ConsultationId::from_value(&Value::String(id)));
    let conn = ctx.open_db()?;
    let session = handle.lock()?;

    let vaccines = workflow::load_vaccination(&conn, &session, requested)?.unwrap_or_default();

    Ok(Json(ChecklistResponse {
        success: true,
        consultation_id: session.consultation_id().or(requested),
        vaccines,
    }))
}

#[derive(Serialize)]
pub struct SaveChecklistResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<ConsultationId>,
    pub vaccines_count: usize,
}

/// `POST /api/vaccinations`: `{csrf_token, consultation_id?, vaccines}`.
pub async fn save(
    State(ctx): State<ApiContext>,
    Extension(handle): Extension<SessionHandle>,
    payload: Result<Json<FieldMap>, JsonRejection>,
) -> Result<Json<SaveChecklistResponse>, ApiError> {
    let Json(raw) = payload?;
    let mut conn = ctx.open_db()?;
    let mut session = handle.lock()?;

    let outcome = workflow::save_vaccination(&mut conn, &mut session, &raw)?;

    Ok(Json(SaveChecklistResponse {
        success: true,
        message: if outcome.persisted() {
            "Données de vaccination sauvegardées avec succès"
        } else {
            "Données de vaccination sauvegardées en session"
        },
        consultation_id: outcome.consultation_id,
        vaccines_count: outcome.vaccines_count,
    }))
}
