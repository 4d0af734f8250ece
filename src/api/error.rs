//! API error types with structured JSON responses.
//!
//! Every failure answers `{success: false, code, message, errors?}`; the
//! `message` is the French text shown by the wizard.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::intake::{IntakeError, ValidationErrors};

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid CSRF token")]
    CsrfInvalid,
    #[error("Session expired")]
    SessionExpired,
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Unknown wizard step: {0}")]
    UnknownStep(String),
    #[error("Consultation {0} does not belong to this session")]
    IdentifierMismatch(String),
    #[error("No vaccination data provided")]
    EmptyChecklist,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut errors = None;
        let (status, code, message) = match self {
            ApiError::CsrfInvalid => {
                tracing::warn!("Rejected request with invalid CSRF token");
                (StatusCode::FORBIDDEN, "CSRF_INVALID", "Token CSRF invalide".to_string())
            }
            ApiError::SessionExpired => {
                tracing::warn!("Rejected request on expired session");
                (StatusCode::UNAUTHORIZED, "SESSION_EXPIRED", "Session expirée".to_string())
            }
            ApiError::Validation(fields) => {
                errors = Some(fields);
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Données invalides".to_string())
            }
            ApiError::UnknownStep(step) => (
                StatusCode::BAD_REQUEST,
                "UNKNOWN_STEP",
                format!("Étape inconnue: {step}"),
            ),
            ApiError::IdentifierMismatch(_) => (
                StatusCode::BAD_REQUEST,
                "IDENTIFIER_MISMATCH",
                "La consultation ne correspond pas à la session".to_string(),
            ),
            ApiError::EmptyChecklist => (
                StatusCode::BAD_REQUEST,
                "EMPTY_CHECKLIST",
                "Aucune donnée de vaccination fournie".to_string(),
            ),
            ApiError::NotFound(detail) => {
                tracing::debug!(detail, "Resource not found");
                (StatusCode::NOT_FOUND, "NOT_FOUND", "Consultation non trouvée".to_string())
            }
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Erreur lors de la sauvegarde des données".to_string(),
                )
            }
        };

        let body = ErrorBody {
            success: false,
            code,
            message,
            errors,
        };
        (status, Json(body)).into_response()
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Auth => ApiError::CsrfInvalid,
            IntakeError::SessionExpired => ApiError::SessionExpired,
            IntakeError::Validation(errors) => ApiError::Validation(errors),
            IntakeError::UnknownStep(step) => ApiError::UnknownStep(step),
            IntakeError::IdentifierMismatch { requested } => ApiError::IdentifierMismatch(requested),
            IntakeError::NotFound(what) => ApiError::NotFound(what),
            IntakeError::EmptyChecklist => ApiError::EmptyChecklist,
            IntakeError::Persistence(e) => ApiError::Internal(e.to_string()),
            IntakeError::Report(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::LockPoisoned => ApiError::Internal("lock poisoned".into()),
            CoreError::Database(e) => ApiError::from(e),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::from(IntakeError::from(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Malformed JSON body");
        ApiError::BadRequest("Données invalides".into())
    }
}
