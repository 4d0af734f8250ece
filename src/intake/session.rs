//! Per-browser wizard state.
//!
//! One `WizardSession` per session cookie. It owns the CSRF token, the
//! consultation identifier once assigned, the sanitized snapshot of every
//! saved step, and the standalone vaccination checklist.
//!
//! Lifecycle: `Fresh → Active → (Completed | Expired)`. A completed session
//! re-enters `Fresh` on its next touch; an expired one has already been
//! wiped and is dropped by the store.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use subtle::ConstantTimeEq;

use super::steps::Step;
use super::IntakeError;
use crate::api::types::{generate_token, hash_token};
use crate::models::{ConsultationId, FieldMap, VaccinationChecklist};

/// Key under which `resume()` exposes the vaccination checklist.
pub const VACCINATION_CALENDAR_KEY: &str = "vaccination_calendar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No wizard data yet.
    Fresh,
    /// At least one step or checklist saved.
    Active,
    /// Final report generated; wizard state wiped.
    Completed,
    /// Inactivity timeout elapsed; wizard state wiped.
    Expired,
}

#[derive(Debug)]
pub struct WizardSession {
    csrf_token: String,
    phase: SessionPhase,
    consultation_id: Option<ConsultationId>,
    current_step: Option<Step>,
    snapshots: BTreeMap<Step, FieldMap>,
    vaccination: Option<VaccinationChecklist>,
    /// The checklist was saved without an identifier and still has to be
    /// written to storage.
    vaccination_pending: bool,
    draft: Option<FieldMap>,
    last_activity: Instant,
    timeout: Duration,
}

impl WizardSession {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            csrf_token: generate_token(),
            phase: SessionPhase::Fresh,
            consultation_id: None,
            current_step: None,
            snapshots: BTreeMap::new(),
            vaccination: None,
            vaccination_pending: false,
            draft: None,
            last_activity: now,
            timeout,
        }
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn consultation_id(&self) -> Option<ConsultationId> {
        self.consultation_id
    }

    pub fn current_step(&self) -> Option<Step> {
        self.current_step
    }

    // ── Request gate ────────────────────────────────────────

    /// Compare the submitted CSRF token in constant time.
    pub fn validate_request(&self, token: Option<&str>) -> Result<(), IntakeError> {
        let token = token.ok_or(IntakeError::Auth)?;
        let expected = hash_token(&self.csrf_token);
        let submitted = hash_token(token);
        if expected.ct_eq(&submitted).unwrap_u8() == 0 {
            return Err(IntakeError::Auth);
        }
        Ok(())
    }

    /// Enforce the inactivity timeout, then refresh the activity clock.
    ///
    /// An expired session is wiped and reported; a completed one starts
    /// over as `Fresh`.
    pub fn check_expiry(&mut self, now: Instant) -> Result<(), IntakeError> {
        if now.saturating_duration_since(self.last_activity) > self.timeout {
            self.wipe();
            self.phase = SessionPhase::Expired;
            return Err(IntakeError::SessionExpired);
        }
        if self.phase == SessionPhase::Completed {
            self.wipe();
            self.phase = SessionPhase::Fresh;
        }
        self.last_activity = now;
        Ok(())
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.phase == SessionPhase::Expired
            || now.saturating_duration_since(self.last_activity) > self.timeout
    }

    // ── Identifier ──────────────────────────────────────────

    /// Pick the identifier for a write. The session's own identifier wins;
    /// a request naming a different one is rejected.
    pub fn resolve_identifier(
        &self,
        requested: Option<ConsultationId>,
    ) -> Result<Option<ConsultationId>, IntakeError> {
        match (self.consultation_id, requested) {
            (Some(own), Some(other)) if own != other => Err(IntakeError::IdentifierMismatch {
                requested: other.to_string(),
            }),
            (Some(own), _) => Ok(Some(own)),
            (None, requested) => Ok(requested),
        }
    }

    /// Bind the session to an identifier. Never replaces an existing one.
    pub fn assign_consultation(&mut self, id: ConsultationId) {
        if self.consultation_id.is_none() {
            self.consultation_id = Some(id);
        }
        self.phase = SessionPhase::Active;
    }

    // ── Steps ───────────────────────────────────────────────

    /// Remember a persisted step.
    pub fn record_step(&mut self, step: Step, id: ConsultationId, snapshot: FieldMap) {
        self.assign_consultation(id);
        self.snapshots.insert(step, snapshot);
        self.current_step = Some(step);
    }

    /// Prefill data: every step snapshot merged in step order (later steps
    /// win on equal keys), plus the vaccination checklist.
    pub fn resume(&self) -> FieldMap {
        let mut prefill = FieldMap::new();
        for snapshot in self.snapshots.values() {
            for (key, value) in snapshot {
                prefill.insert(key.clone(), value.clone());
            }
        }
        if let Some(checklist) = &self.vaccination {
            if let Ok(value) = serde_json::to_value(checklist) {
                prefill.insert(VACCINATION_CALENDAR_KEY.to_string(), value);
            }
        }
        prefill
    }

    // ── Vaccination sub-flow ────────────────────────────────

    /// Remember a checklist. `persisted` is false when it has only been kept
    /// in the session and must be merged into storage later.
    pub fn record_vaccination(&mut self, checklist: VaccinationChecklist, persisted: bool) {
        self.vaccination = Some(checklist);
        self.vaccination_pending = !persisted;
        self.phase = SessionPhase::Active;
    }

    pub fn vaccination(&self) -> Option<&VaccinationChecklist> {
        self.vaccination.as_ref()
    }

    /// The checklist still waiting to be written, if any.
    pub fn pending_vaccination(&self) -> Option<&VaccinationChecklist> {
        self.vaccination.as_ref().filter(|_| self.vaccination_pending)
    }

    pub fn mark_vaccination_merged(&mut self) {
        self.vaccination_pending = false;
    }

    // ── Draft ───────────────────────────────────────────────

    /// Keep the raw, unvalidated form so a reload can restore it.
    pub fn save_draft(&mut self, mut draft: FieldMap) {
        draft.remove("csrf_token");
        draft.remove("action");
        self.draft = Some(draft);
        if self.phase == SessionPhase::Fresh {
            self.phase = SessionPhase::Active;
        }
    }

    pub fn draft(&self) -> Option<&FieldMap> {
        self.draft.as_ref()
    }

    // ── Reset ───────────────────────────────────────────────

    /// Drop all wizard state. The CSRF token survives.
    pub fn clear(&mut self) {
        self.wipe();
        self.phase = SessionPhase::Fresh;
    }

    /// Final submission succeeded.
    pub fn complete(&mut self) {
        self.wipe();
        self.phase = SessionPhase::Completed;
    }

    fn wipe(&mut self) {
        self.consultation_id = None;
        self.current_step = None;
        self.snapshots.clear();
        self.vaccination = None;
        self.vaccination_pending = false;
        self.draft = None;
    }
}

/// CSRF token of a request: the `csrf_token` field of a JSON body.
pub fn body_token(body: &FieldMap) -> Option<&str> {
    body.get("csrf_token").and_then(Value::as_str)
}
