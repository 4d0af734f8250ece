//! Final submission endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionHandle};
use crate::intake::workflow;
use crate::models::FieldMap;

/// `POST /api/report`: render the consultation report as a PDF download.
/// The wizard state is cleared once the document is produced.
pub async fn generate(
    State(ctx): State<ApiContext>,
    Extension(handle): Extension<SessionHandle>,
    payload: Result<Json<FieldMap>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(raw) = payload?;
    let conn = ctx.open_db()?;
    let mut session = handle.lock()?;

    let report = workflow::generate_report(&conn, &mut session, &raw)?;

    let disposition = format!("attachment; filename=\"{}\"", report.filename);
    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        report.bytes,
    )
        .into_response())
}
