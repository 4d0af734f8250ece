//! The nine wizard steps: rule tables and target records.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;

use super::validator::{FieldRules, Rule};
use super::IntakeError;
use crate::models::{RecordKind, Sex, SickleType, YesNo};

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{9}$").expect("static phone pattern"));

const YES_NO: Rule = Rule::OneOf(YesNo::VALUES);

/// Fields holding an emergency phone number, normalized before validation.
pub const PHONE_FIELDS: &[&str] = &["emergency_contact_phone"];

/// Field holding the list of exams to perform before the next consultation.
pub const EXAMS_FIELD: &str = "examens_avant_consultation";

/// Field of step 6 carrying the vaccination checklist as JSON text.
pub const VACCINATION_FIELD: &str = "vaccination_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    Administrative = 1,
    Demographics = 2,
    Treatments = 3,
    MedicalHistory = 4,
    Psychosocial = 5,
    Vaccinations = 6,
    FollowUpPlan = 7,
    PlannedExams = 8,
    Comments = 9,
}

impl Step {
    pub const ALL: [Step; 9] = [
        Step::Administrative,
        Step::Demographics,
        Step::Treatments,
        Step::MedicalHistory,
        Step::Psychosocial,
        Step::Vaccinations,
        Step::FollowUpPlan,
        Step::PlannedExams,
        Step::Comments,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|step| i64::from(step.number()) == number)
    }

    /// Parse the `current_step` sent by the wizard, as a number or a
    /// numeric string. Missing and out-of-range values are rejected.
    pub fn from_value(value: Option<&Value>) -> Result<Self, IntakeError> {
        let number = match value {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        number.and_then(Self::from_number).ok_or_else(|| {
            IntakeError::UnknownStep(match value {
                None | Some(Value::Null) => "missing".to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
        })
    }

    /// Record the step's fields are written to.
    pub fn target(self) -> RecordKind {
        match self {
            Step::Administrative | Step::Demographics | Step::PlannedExams | Step::Comments => {
                RecordKind::Consultation
            }
            Step::Treatments => RecordKind::Treatment,
            Step::MedicalHistory => RecordKind::Exam,
            Step::Psychosocial | Step::FollowUpPlan => RecordKind::Observation,
            Step::Vaccinations => RecordKind::Vaccination,
        }
    }

    pub fn rules(self) -> &'static [FieldRules] {
        match self {
            Step::Administrative => ADMINISTRATIVE,
            Step::Demographics => DEMOGRAPHICS,
            Step::Treatments => TREATMENTS,
            Step::MedicalHistory => MEDICAL_HISTORY,
            Step::Psychosocial => PSYCHOSOCIAL,
            Step::Vaccinations => VACCINATIONS,
            Step::FollowUpPlan => FOLLOW_UP_PLAN,
            Step::PlannedExams => PLANNED_EXAMS,
            Step::Comments => COMMENTS,
        }
    }

    /// Fields declared by the step, in table order.
    pub fn fields(self) -> impl Iterator<Item = &'static str> {
        self.rules().iter().map(|entry| entry.field)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

// ═══════════════════════════════════════════════════════════
// Rule tables
// ═══════════════════════════════════════════════════════════

macro_rules! field {
    ($name:expr, [$($rule:expr),+ $(,)?]) => {
        FieldRules { field: $name, rules: &[$($rule),+] }
    };
}

static ADMINISTRATIVE: &[FieldRules] = &[
    field!("fosa", [Rule::Required, Rule::IsString, Rule::MaxLength(255)]),
    field!("region", [Rule::Required, Rule::IsString, Rule::MaxLength(255)]),
    field!("district", [Rule::IsString, Rule::MaxLength(255)]),
    field!("diagnostic_date", [Rule::Date]),
    field!("ipp", [Rule::IsString, Rule::MaxLength(255)]),
    field!("personnel", [Rule::IsString, Rule::MaxLength(255)]),
    field!("referred", [YES_NO]),
    field!("referred_from", [Rule::IsString, Rule::MaxLength(255)]),
    field!("referred_for", [Rule::IsString, Rule::MaxLength(255)]),
    field!("evolution", [Rule::IsString, Rule::MaxLength(255)]),
];

static DEMOGRAPHICS: &[FieldRules] = &[
    field!("full_name", [Rule::Required, Rule::IsString, Rule::MaxLength(255)]),
    field!("age", [Rule::IsInteger, Rule::MinValue(0)]),
    field!("birth_date", [Rule::Date]),
    field!("sex", [Rule::OneOf(Sex::VALUES)]),
    field!("address", [Rule::IsString]),
    field!("emergency_contact_name", [Rule::IsString, Rule::MaxLength(255)]),
    field!("emergency_contact_relation", [Rule::IsString, Rule::MaxLength(255)]),
    field!("emergency_contact_phone", [Rule::Nullable, Rule::Pattern(&PHONE_PATTERN)]),
    field!("lives_with", [YES_NO]),
    field!("insurance", [YES_NO]),
    field!("support_group", [YES_NO]),
    field!("group_name", [Rule::IsString, Rule::MaxLength(255)]),
    field!("parents", [YES_NO]),
    field!("sibling_rank", [Rule::IsInteger, Rule::MinValue(1)]),
];

static TREATMENTS: &[FieldRules] = &[
    field!("hydroxyurea", [YES_NO]),
    field!("tolerance", [Rule::IsString, Rule::MaxLength(50)]),
    field!("hydroxyurea_reasons", [Rule::IsString, Rule::MaxLength(255)]),
    field!("hydroxyurea_dosage", [Rule::IsString, Rule::MaxLength(100)]),
    field!("folic_acid", [YES_NO]),
    field!("penicillin", [YES_NO]),
    field!("regular_transfusion", [YES_NO]),
    field!("transfusion_type", [Rule::IsString, Rule::MaxLength(50)]),
    field!("transfusion_frequency", [Rule::IsString, Rule::MaxLength(100)]),
    field!("last_transfusion_date", [Rule::Date]),
    field!("other_treatments", [Rule::IsString]),
];

static MEDICAL_HISTORY: &[FieldRules] = &[
    field!("sickle_type", [Rule::OneOf(SickleType::VALUES)]),
    field!("diagnosis_age", [Rule::IsString, Rule::MaxLength(50)]),
    field!("diagnosis_circumstance", [Rule::IsString, Rule::MaxLength(50)]),
    field!("family_history", [Rule::IsString, Rule::MaxLength(50)]),
    field!("other_medical_history", [YES_NO]),
    field!("previous_surgeries", [YES_NO]),
    field!("allergies", [YES_NO]),
    field!("vocs", [Rule::IsString, Rule::MaxLength(50)]),
    field!("hospitalizations", [Rule::IsString, Rule::MaxLength(50)]),
];

static PSYCHOSOCIAL: &[FieldRules] = &[
    field!("impact_scolaire", [YES_NO]),
    field!("accompagnement_psychologique", [YES_NO]),
    field!("soutien_social", [YES_NO]),
    field!("famille_informee", [YES_NO]),
    field!("date_prochaine_consultation", [Rule::Date]),
];

static VACCINATIONS: &[FieldRules] = &[field!(VACCINATION_FIELD, [Rule::IsString, Rule::Checklist])];

static FOLLOW_UP_PLAN: &[FieldRules] = &[
    field!("plan_suivi_personnalise", [Rule::IsString, Rule::MaxLength(100)]),
    field!("education_therapeutique", [YES_NO]),
    field!("date_prochaine_consultation_plan", [Rule::Date]),
];

static PLANNED_EXAMS: &[FieldRules] = &[field!(EXAMS_FIELD, [Rule::IsArray])];

static COMMENTS: &[FieldRules] = &[field!("commentaires", [Rule::IsString])];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use serde_json::json;

    #[test]
    fn step_numbers_round_trip() {
        for step in Step::ALL {
            assert_eq!(Step::from_number(i64::from(step.number())), Some(step));
        }
    }

    #[test]
    fn unknown_steps_are_rejected() {
        assert!(matches!(Step::from_value(Some(&json!(0))), Err(IntakeError::UnknownStep(_))));
        assert!(matches!(Step::from_value(Some(&json!(10))), Err(IntakeError::UnknownStep(_))));
        assert!(Step::from_value(None).is_err());
        assert!(Step::from_value(Some(&json!("abc"))).is_err());
    }

    #[test]
    fn step_accepts_numeric_strings() {
        assert_eq!(Step::from_value(Some(&json!("3"))).unwrap(), Step::Treatments);
        assert_eq!(Step::from_value(Some(&json!(9))).unwrap(), Step::Comments);
    }

    #[test]
    fn step_targets() {
        let targets: Vec<RecordKind> = Step::ALL.iter().map(|s| s.target()).collect();
        assert_eq!(
            targets,
            vec![
                RecordKind::Consultation,
                RecordKind::Consultation,
                RecordKind::Treatment,
                RecordKind::Exam,
                RecordKind::Observation,
                RecordKind::Vaccination,
                RecordKind::Observation,
                RecordKind::Consultation,
                RecordKind::Consultation,
            ]
        );
    }

    #[test]
    fn consultation_steps_only_declare_consultation_columns() {
        for step in Step::ALL.into_iter().filter(|s| s.target() == RecordKind::Consultation) {
            for field in step.fields() {
                assert!(ConsultationFields::COLUMNS.contains(&field), "{field}");
            }
        }
    }

    #[test]
    fn satellite_steps_declare_their_columns() {
        for field in Step::Treatments.fields() {
            assert!(TreatmentRecord::COLUMNS.contains(&field), "{field}");
        }
        for field in Step::MedicalHistory.fields() {
            assert!(ExamRecord::COLUMNS.contains(&field), "{field}");
        }
        for step in [Step::Psychosocial, Step::FollowUpPlan] {
            for field in step.fields() {
                assert!(ObservationRecord::COLUMNS.contains(&field), "{field}");
            }
        }
    }

    #[test]
    fn observation_steps_write_disjoint_fields() {
        let psychosocial: Vec<_> = Step::Psychosocial.fields().collect();
        for field in Step::FollowUpPlan.fields() {
            assert!(!psychosocial.contains(&field), "{field}");
        }
    }

    #[test]
    fn serializes_as_number() {
        assert_eq!(serde_json::to_value(Step::PlannedExams).unwrap(), json!(8));
    }
}
