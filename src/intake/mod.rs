//! Step-wise intake orchestration.
//!
//! A wizard step arrives as a flat field map. It is sanitized, checked
//! against the step's rule table, routed to its record and persisted in a
//! single transaction. The caller's `WizardSession` then records the
//! snapshot so the wizard can be resumed.
//!
//! Pipeline per step: Sanitizer → Validator → Step router → Session.

pub mod router;
pub mod sanitizer;
pub mod session;
pub mod steps;
pub mod vaccination;
pub mod validator;
pub mod workflow;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::DatabaseError;

pub use router::{persist_step, prepare_step, PreparedStep, RecordWrite};
pub use session::{SessionPhase, WizardSession};
pub use steps::Step;
pub use workflow::{RenderedReport, StepOutcome, VaccinationOutcome};

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Invalid CSRF token")]
    Auth,
    #[error("Session expired")]
    SessionExpired,
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Unknown wizard step: {0}")]
    UnknownStep(String),
    #[error("Consultation {requested} does not belong to this session")]
    IdentifierMismatch { requested: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No vaccination data provided")]
    EmptyChecklist,
    #[error("Persistence error: {0}")]
    Persistence(DatabaseError),
    #[error("Report error: {0}")]
    Report(String),
}

impl From<DatabaseError> for IntakeError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => {
                IntakeError::NotFound(format!("{entity_type} {id}"))
            }
            other => IntakeError::Persistence(other),
        }
    }
}

impl From<ValidationErrors> for IntakeError {
    fn from(errors: ValidationErrors) -> Self {
        IntakeError::Validation(errors)
    }
}

// ═══════════════════════════════════════════════════════════
// Validation errors
// ═══════════════════════════════════════════════════════════

/// Violations collected over a whole field map: field → messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Append another set of violations, prefixing their field names.
    pub fn merge_prefixed(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, messages) in other.0 {
            self.0
                .entry(format!("{prefix}.{field}"))
                .or_default()
                .extend(messages);
        }
    }

    /// Append another set of violations as-is.
    pub fn extend(&mut self, other: ValidationErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "{} invalid field(s): {}", fields.len(), fields.join(", "))
    }
}
