//! Request-level operations over one wizard session.
//!
//! Each function takes the caller's locked `WizardSession` and an open
//! connection; the HTTP layer only decodes and encodes.

use chrono::Local;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use serde_json::Value;

use super::router::{persist_step, prepare_step, RecordWrite};
use super::session::{body_token, WizardSession};
use super::steps::Step;
use super::vaccination::sanitize_checklist;
use super::{IntakeError, ValidationErrors};
use crate::db::{repository, DatabaseError};
use crate::models::{ConsultationId, FieldMap, VaccinationChecklist};
use crate::report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub consultation_id: ConsultationId,
    pub step: Step,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VaccinationOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_id: Option<ConsultationId>,
    pub vaccines_count: usize,
}

impl VaccinationOutcome {
    /// Whether the checklist reached storage or only the session.
    pub fn persisted(&self) -> bool {
        self.consultation_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub consultation_id: ConsultationId,
    pub filename: String,
    pub bytes: Vec<u8>,
}

fn requested_id(raw: &FieldMap) -> Option<ConsultationId> {
    raw.get("consultation_id").and_then(ConsultationId::from_value)
}

// ═══════════════════════════════════════════════════════════
// Steps
// ═══════════════════════════════════════════════════════════

/// Validate and persist one wizard step.
pub fn save_step(
    conn: &mut Connection,
    session: &mut WizardSession,
    raw: &FieldMap,
) -> Result<StepOutcome, IntakeError> {
    session.validate_request(body_token(raw))?;

    let step = Step::from_value(raw.get("current_step"))?;
    let existing = session.resolve_identifier(requested_id(raw))?;
    let prepared = prepare_step(step, raw)?;

    let pending = session.pending_vaccination().cloned();
    // An empty step 6 keeps whatever checklist the session already holds.
    let carried = match prepared.write {
        RecordWrite::VaccinationEmpty => session.vaccination().cloned(),
        _ => pending.clone(),
    };
    let id = persist_step(conn, existing, &prepared.write, carried.as_ref()).map_err(|e| {
        tracing::error!(
            consultation_id = ?existing.map(|id| id.0),
            step = step.number(),
            error = %e,
            "Step save failed"
        );
        IntakeError::from(e)
    })?;

    session.record_step(step, id, prepared.snapshot);
    if pending.is_some() {
        session.mark_vaccination_merged();
    }
    if let RecordWrite::Vaccination(checklist) = prepared.write {
        session.record_vaccination(checklist, true);
    }

    tracing::info!(consultation_id = id.0, step = step.number(), "Step saved");
    Ok(StepOutcome { consultation_id: id, step })
}

/// Keep the in-progress form in the session. Nothing is validated or stored.
pub fn save_draft(session: &mut WizardSession, raw: &FieldMap) -> Result<(), IntakeError> {
    session.validate_request(body_token(raw))?;
    session.save_draft(raw.clone());
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Vaccination calendar
// ═══════════════════════════════════════════════════════════

/// Save the standalone vaccination checklist.
///
/// With an identifier the checklist is written immediately; without one it
/// stays in the session until the first step save creates the consultation.
pub fn save_vaccination(
    conn: &mut Connection,
    session: &mut WizardSession,
    raw: &FieldMap,
) -> Result<VaccinationOutcome, IntakeError> {
    session.validate_request(body_token(raw))?;

    let vaccines = match raw.get("vaccines") {
        None | Some(Value::Null) => return Err(IntakeError::EmptyChecklist),
        Some(Value::Object(map)) if map.is_empty() => return Err(IntakeError::EmptyChecklist),
        Some(Value::Array(items)) if items.is_empty() => return Err(IntakeError::EmptyChecklist),
        Some(value) => value,
    };
    let checklist = sanitize_checklist(vaccines).map_err(|inner| {
        let mut errors = ValidationErrors::new();
        errors.merge_prefixed("vaccines", inner);
        errors
    })?;
    if checklist.is_empty() {
        return Err(IntakeError::EmptyChecklist);
    }
    let vaccines_count = checklist.len();

    let Some(id) = session.resolve_identifier(requested_id(raw))? else {
        session.record_vaccination(checklist, false);
        tracing::info!(vaccines_count, "Vaccination checklist kept in session");
        return Ok(VaccinationOutcome { consultation_id: None, vaccines_count });
    };

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(DatabaseError::from)?;
    repository::require_consultation(&tx, id)?;
    repository::upsert_vaccinations(&tx, id, &checklist).map_err(|e| {
        tracing::error!(consultation_id = id.0, error = %e, "Vaccination save failed");
        e
    })?;
    tx.commit().map_err(DatabaseError::from)?;

    session.record_vaccination(checklist, true);
    session.assign_consultation(id);
    tracing::info!(consultation_id = id.0, vaccines_count, "Vaccination checklist saved");
    Ok(VaccinationOutcome { consultation_id: Some(id), vaccines_count })
}

/// Current checklist: the session's copy first, then storage.
pub fn load_vaccination(
    conn: &Connection,
    session: &WizardSession,
    requested: Option<ConsultationId>,
) -> Result<Option<VaccinationChecklist>, IntakeError> {
    if let Some(checklist) = session.vaccination() {
        return Ok(Some(checklist.clone()));
    }
    let Some(id) = session.resolve_identifier(requested)? else {
        return Ok(None);
    };
    repository::require_consultation(conn, id)?;
    let checklist = repository::get_vaccinations(conn, id)?;
    Ok((!checklist.is_empty()).then_some(checklist))
}

// ═══════════════════════════════════════════════════════════
// Final submission
// ═══════════════════════════════════════════════════════════

/// Render the consultation report and close the wizard.
pub fn generate_report(
    conn: &Connection,
    session: &mut WizardSession,
    raw: &FieldMap,
) -> Result<RenderedReport, IntakeError> {
    session.validate_request(body_token(raw))?;

    let Some(id) = session.resolve_identifier(requested_id(raw))? else {
        let mut errors = ValidationErrors::new();
        errors.add("consultation_id", "ID de consultation manquant");
        return Err(errors.into());
    };

    let assembled = report::assemble_report(conn, id)?;
    let generated_at = Local::now().naive_local();
    let bytes = report::render_pdf(&assembled, generated_at)
        .map_err(|e| IntakeError::Report(e.to_string()))?;
    let filename = report::report_filename(assembled.patient_name(), generated_at);

    session.complete();
    tracing::info!(consultation_id = id.0, filename = %filename, "Consultation report generated");
    Ok(RenderedReport { consultation_id: id, filename, bytes })
}

/// Explicit reset of the wizard. Idempotent.
pub fn clear_session(session: &mut WizardSession, token: Option<&str>) -> Result<(), IntakeError> {
    session.validate_request(token)?;
    session.clear();
    tracing::info!("Wizard session cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::intake::SessionPhase;
    use crate::models::{TreatmentRecord, VaccineCode};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn session() -> WizardSession {
        WizardSession::new(Duration::from_secs(1800), Instant::now())
    }

    fn body(token: &str, value: Value) -> FieldMap {
        let mut map = value.as_object().cloned().unwrap();
        map.insert("csrf_token".into(), json!(token));
        map
    }

    fn consultation_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM consultations", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn first_step_assigns_identifier_and_later_steps_reuse_it() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();

        let first = save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": 1, "fosa": "CSI Biyem-Assi", "region": "Centre" })),
        )
        .unwrap();
        let second = save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": "3", "hydroxyurea": "Non" })),
        )
        .unwrap();

        assert_eq!(first.consultation_id, second.consultation_id);
        assert_eq!(second.step, Step::Treatments);
        assert_eq!(session.consultation_id(), Some(first.consultation_id));
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(consultation_count(&conn), 1);

        let stored = repository::get_satellite::<TreatmentRecord>(&conn, first.consultation_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.hydroxyurea_reasons.as_deref(), Some("RAS"));
    }

    #[test]
    fn bad_csrf_token_writes_nothing() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        let mut raw = body(&token, json!({ "current_step": 2, "full_name": "Jean Kamga" }));
        raw.insert("csrf_token".into(), json!("forged"));

        let err = save_step(&mut conn, &mut session, &raw).unwrap_err();
        assert!(matches!(err, IntakeError::Auth));
        assert_eq!(consultation_count(&conn), 0);
        assert!(session.resume().is_empty());
    }

    #[test]
    fn unknown_step_is_rejected() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        let err = save_step(&mut conn, &mut session, &body(&token, json!({ "current_step": 12 })))
            .unwrap_err();
        assert!(matches!(err, IntakeError::UnknownStep(_)));
    }

    #[test]
    fn validation_failure_leaves_session_untouched() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        let err = save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": 2, "age": "-1" })),
        )
        .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(_)));
        assert_eq!(session.consultation_id(), None);
        assert_eq!(consultation_count(&conn), 0);
    }

    #[test]
    fn foreign_identifier_is_rejected() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        let own = save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": 9, "commentaires": "Stable" })),
        )
        .unwrap();

        let err = save_step(
            &mut conn,
            &mut session,
            &body(
                &token,
                json!({ "current_step": 9, "consultation_id": own.consultation_id.0 + 1 }),
            ),
        )
        .unwrap_err();
        assert!(matches!(err, IntakeError::IdentifierMismatch { .. }));
    }

    #[test]
    fn unknown_requested_identifier_is_not_found() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        let err = save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": 9, "consultation_id": "41" })),
        )
        .unwrap_err();
        assert!(matches!(err, IntakeError::NotFound(_)));
    }

    #[test]
    fn vaccination_without_identifier_is_merged_by_next_step() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();

        let outcome = save_vaccination(
            &mut conn,
            &mut session,
            &body(&token, json!({ "vaccines": { "bcg": { "selected": "1", "received": "Oui" } } })),
        )
        .unwrap();
        assert!(!outcome.persisted());
        assert_eq!(outcome.vaccines_count, 1);
        assert!(session.pending_vaccination().is_some());

        let step = save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": 1, "fosa": "CSI", "region": "Littoral" })),
        )
        .unwrap();

        let stored = repository::get_vaccinations(&conn, step.consultation_id).unwrap();
        assert!(stored.get(VaccineCode::Bcg).is_some());
        assert!(session.pending_vaccination().is_none());
    }

    #[test]
    fn vaccination_with_identifier_is_written_immediately() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        let step = save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": 9, "commentaires": "RAS" })),
        )
        .unwrap();

        let outcome = save_vaccination(
            &mut conn,
            &mut session,
            &body(&token, json!({ "vaccines": { "vpo0": { "received": "Non" } } })),
        )
        .unwrap();
        assert_eq!(outcome.consultation_id, Some(step.consultation_id));

        let loaded = load_vaccination(&conn, &session, None).unwrap().unwrap();
        assert!(loaded.get(VaccineCode::Vpo0).is_some());
    }

    #[test]
    fn empty_step_six_after_saved_checklist_keeps_it() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        let step = save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": 1, "fosa": "CSI", "region": "Ouest" })),
        )
        .unwrap();
        save_vaccination(
            &mut conn,
            &mut session,
            &body(&token, json!({ "vaccines": { "bcg": { "selected": "1", "received": "Oui" } } })),
        )
        .unwrap();

        save_step(&mut conn, &mut session, &body(&token, json!({ "current_step": 6 }))).unwrap();

        let stored = repository::get_vaccinations(&conn, step.consultation_id).unwrap();
        assert_eq!(Some(&stored), session.vaccination());
        assert!(stored.get(VaccineCode::Bcg).is_some());
        assert_ne!(
            repository::get_vaccination_blob(&conn, step.consultation_id).unwrap().as_deref(),
            Some("RAS")
        );
    }

    #[test]
    fn empty_vaccination_payload_is_rejected() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        for vaccines in [json!(null), json!({}), json!([])] {
            let err = save_vaccination(&mut conn, &mut session, &body(&token, json!({ "vaccines": vaccines })))
                .unwrap_err();
            assert!(matches!(err, IntakeError::EmptyChecklist));
        }
    }

    #[test]
    fn load_vaccination_falls_back_to_storage() {
        let conn = open_memory_database().unwrap();
        let id = repository::insert_consultation(&conn).unwrap();
        let mut checklist = VaccinationChecklist::default();
        checklist.0.insert(VaccineCode::FievreJaune, Default::default());
        repository::upsert_vaccinations(&conn, id, &checklist).unwrap();

        let session = session();
        let loaded = load_vaccination(&conn, &session, Some(id)).unwrap();
        assert_eq!(loaded, Some(checklist));
        assert_eq!(load_vaccination(&conn, &session, None).unwrap(), None);
    }

    #[test]
    fn report_requires_identifier() {
        let conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        let err = generate_report(&conn, &mut session, &body(&token, json!({}))).unwrap_err();
        assert!(matches!(err, IntakeError::Validation(ref e) if e.contains("consultation_id")));
    }

    #[test]
    fn report_completes_the_session() {
        let mut conn = open_memory_database().unwrap();
        let mut session = session();
        let token = session.csrf_token().to_string();
        save_step(
            &mut conn,
            &mut session,
            &body(&token, json!({ "current_step": 2, "full_name": "Jean Kamga", "age": 7 })),
        )
        .unwrap();

        let report = generate_report(&conn, &mut session, &body(&token, json!({}))).unwrap();
        assert!(report.bytes.starts_with(b"%PDF"));
        assert!(report.filename.starts_with("consultation_report_Jean_Kamga_"));
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert_eq!(session.consultation_id(), None);
    }

    #[test]
    fn clear_requires_token_and_is_idempotent() {
        let mut session = session();
        let token = session.csrf_token().to_string();
        assert!(matches!(clear_session(&mut session, None), Err(IntakeError::Auth)));
        clear_session(&mut session, Some(&token)).unwrap();
        clear_session(&mut session, Some(&token)).unwrap();
        assert_eq!(session.phase(), SessionPhase::Fresh);
    }

    #[test]
    fn draft_is_kept_without_persisting() {
        let mut session = session();
        let token = session.csrf_token().to_string();
        save_draft(&mut session, &body(&token, json!({ "fosa": "CSI", "age": "abc" }))).unwrap();
        assert_eq!(session.draft().unwrap()["age"], json!("abc"));
        assert_eq!(session.consultation_id(), None);
    }
}
