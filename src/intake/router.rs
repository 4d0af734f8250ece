//! Step routing: from a raw step payload to one transactional write.
//!
//! `prepare_step` is pure (sanitize, normalize, validate, default) and
//! `persist_step` performs the write inside one IMMEDIATE transaction, so
//! a failed step leaves storage untouched and never leaks a fresh id.

use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;

use super::sanitizer::{is_blank, sanitize_fields, sanitize_list, sanitize_phone, unescape_html};
use super::steps::{Step, EXAMS_FIELD, PHONE_FIELDS, VACCINATION_FIELD};
use super::validator::validate;
use super::vaccination::decode_checklist;
use super::IntakeError;
use crate::db::repository;
use crate::db::DatabaseError;
use crate::models::*;

/// Placeholder persisted for every declared field left empty ("rien à signaler").
pub const RAS: &str = "RAS";

/// Typed write for the record targeted by a step.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordWrite {
    Consultation(ConsultationPatch),
    Treatment(TreatmentPatch),
    Exam(ExamPatch),
    Observation(ObservationPatch),
    /// Step 6 with a checklist filled in.
    Vaccination(VaccinationChecklist),
    /// Step 6 submitted empty: keep the session's or the stored checklist.
    VaccinationEmpty,
}

impl RecordWrite {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordWrite::Consultation(_) => RecordKind::Consultation,
            RecordWrite::Treatment(_) => RecordKind::Treatment,
            RecordWrite::Exam(_) => RecordKind::Exam,
            RecordWrite::Observation(_) => RecordKind::Observation,
            RecordWrite::Vaccination(_) | RecordWrite::VaccinationEmpty => RecordKind::Vaccination,
        }
    }
}

/// A validated step, ready to persist.
#[derive(Debug, Clone)]
pub struct PreparedStep {
    pub step: Step,
    /// Declared fields as written, with the RAS placeholder applied.
    pub fields: FieldMap,
    /// Declared fields the user actually filled in, for resuming the wizard.
    pub snapshot: FieldMap,
    pub write: RecordWrite,
}

/// Sanitize, normalize and validate one step's payload.
///
/// Only the fields declared by the step are kept; everything else in the
/// payload (CSRF token, step number, other steps' fields) is ignored.
pub fn prepare_step(step: Step, raw: &FieldMap) -> Result<PreparedStep, IntakeError> {
    let mut sanitized = sanitize_fields(raw);

    for field in PHONE_FIELDS {
        if let Some(value) = sanitized.get_mut(*field) {
            *value = sanitize_phone(value).map_or(Value::Null, Value::String);
        }
    }
    if let Some(value) = sanitized.get_mut(EXAMS_FIELD) {
        if let Some(items) = sanitize_list(value) {
            *value = if items.is_empty() { Value::Null } else { Value::Array(items) };
        }
    }

    validate(&sanitized, step.rules())?;

    // Already accepted by the step's `Checklist` rule.
    let checklist = match (step, sanitized.get(VACCINATION_FIELD)) {
        (Step::Vaccinations, Some(Value::String(text))) => {
            Some(decode_checklist(VACCINATION_FIELD, &unescape_html(text))?).filter(|c| !c.is_empty())
        }
        _ => None,
    };

    // Step 6 resumes from the typed checklist, not from its escaped JSON text.
    let snapshot: FieldMap = step
        .fields()
        .filter(|field| *field != VACCINATION_FIELD)
        .filter_map(|field| {
            let value = sanitized.get(field)?;
            (!is_blank(Some(value))).then(|| (field.to_string(), value.clone()))
        })
        .collect();

    let fields: FieldMap = step
        .fields()
        .map(|field| {
            let value = snapshot
                .get(field)
                .cloned()
                .unwrap_or_else(|| Value::String(RAS.to_string()));
            (field.to_string(), value)
        })
        .collect();

    let write = match step.target() {
        RecordKind::Consultation => RecordWrite::Consultation(ConsultationPatch::from_fields(&fields)),
        RecordKind::Treatment => RecordWrite::Treatment(TreatmentPatch::from_fields(&fields)),
        RecordKind::Exam => RecordWrite::Exam(ExamPatch::from_fields(&fields)),
        RecordKind::Observation => RecordWrite::Observation(ObservationPatch::from_fields(&fields)),
        RecordKind::Vaccination => match checklist {
            Some(checklist) => RecordWrite::Vaccination(checklist),
            None => RecordWrite::VaccinationEmpty,
        },
    };

    Ok(PreparedStep { step, fields, snapshot, write })
}

/// Persist a prepared write in one IMMEDIATE transaction.
///
/// Creates the consultation when `existing` is `None`, otherwise requires it
/// to exist. A `pending` standalone checklist is stored alongside, unless the
/// step itself carries a checklist. An empty step 6 writes `pending` if given,
/// leaves an already stored checklist alone, and only otherwise stores RAS.
/// Returns the consultation id.
pub fn persist_step(
    conn: &mut Connection,
    existing: Option<ConsultationId>,
    write: &RecordWrite,
    pending: Option<&VaccinationChecklist>,
) -> Result<ConsultationId, DatabaseError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let id = match existing {
        Some(id) => {
            repository::require_consultation(&tx, id)?;
            id
        }
        None => repository::insert_consultation(&tx)?,
    };

    match write {
        RecordWrite::Consultation(patch) => {
            repository::apply_consultation_patch(&tx, id, patch.clone())?
        }
        RecordWrite::Treatment(patch) => {
            repository::apply_satellite_patch::<TreatmentRecord>(&tx, id, patch.clone())?
        }
        RecordWrite::Exam(patch) => {
            repository::apply_satellite_patch::<ExamRecord>(&tx, id, patch.clone())?
        }
        RecordWrite::Observation(patch) => {
            repository::apply_satellite_patch::<ObservationRecord>(&tx, id, patch.clone())?
        }
        RecordWrite::Vaccination(checklist) => repository::upsert_vaccinations(&tx, id, checklist)?,
        RecordWrite::VaccinationEmpty => match pending {
            Some(checklist) => repository::upsert_vaccinations(&tx, id, checklist)?,
            None if repository::get_vaccination_blob(&tx, id)?.is_some() => {}
            None => repository::upsert_vaccination_blob(&tx, id, RAS)?,
        },
    }

    if let Some(checklist) = pending {
        if write.kind() != RecordKind::Vaccination {
            repository::upsert_vaccinations(&tx, id, checklist)?;
        }
    }

    tx.commit()?;
    Ok(id)
}
