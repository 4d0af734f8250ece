//! Consultation record and its one-to-one satellite records.
//!
//! Every stored column is nullable TEXT: the step router writes the "RAS"
//! sentinel into numeric columns as well, so values stay strings end to end.
//! Each record comes with a `*Patch` companion holding only the columns a
//! step actually supplied; `RecordFields::apply` merges a patch into an
//! existing row without touching the other columns.

use serde::{Deserialize, Serialize};

use super::{field_text, ConsultationId, FieldMap};

/// Column access shared by the consultation row and the satellite records.
pub trait RecordFields: Default {
    type Patch;

    /// Updatable columns, in storage order.
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<Option<&str>>;
    fn get(&self, column: &str) -> Option<&str>;
    fn set(&mut self, column: &str, value: Option<String>);
    fn apply(&mut self, patch: Self::Patch);
}

/// A record stored in its own table, keyed by consultation id.
pub trait SatelliteRecord: RecordFields {
    const TABLE: &'static str;
}

macro_rules! record_fields {
    ($(#[$meta:meta])* $name:ident, $patch:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            $(pub $field: Option<String>),+
        }

        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $patch {
            $(pub $field: Option<String>),+
        }

        impl $patch {
            /// Pick this record's columns out of a step field map.
            pub fn from_fields(fields: &FieldMap) -> Self {
                Self {
                    $($field: field_text(fields, stringify!($field))),+
                }
            }

            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())+
            }
        }

        impl RecordFields for $name {
            type Patch = $patch;

            const COLUMNS: &'static [&'static str] = &[$(stringify!($field)),+];

            fn values(&self) -> Vec<Option<&str>> {
                vec![$(self.$field.as_deref()),+]
            }

            fn get(&self, column: &str) -> Option<&str> {
                match column {
                    $(stringify!($field) => self.$field.as_deref(),)+
                    _ => None,
                }
            }

            fn set(&mut self, column: &str, value: Option<String>) {
                match column {
                    $(stringify!($field) => self.$field = value,)+
                    _ => {}
                }
            }

            fn apply(&mut self, patch: $patch) {
                $(
                    if let Some(value) = patch.$field {
                        self.$field = Some(value);
                    }
                )+
            }
        }
    };
}

record_fields!(
    /// Administrative, demographic and free-text columns of a consultation.
    ConsultationFields, ConsultationPatch {
        fosa,
        region,
        district,
        diagnostic_date,
        ipp,
        personnel,
        referred,
        referred_from,
        referred_for,
        evolution,
        full_name,
        age,
        birth_date,
        sex,
        address,
        emergency_contact_name,
        emergency_contact_relation,
        emergency_contact_phone,
        lives_with,
        insurance,
        support_group,
        group_name,
        parents,
        sibling_rank,
        examens_avant_consultation,
        commentaires,
    }
);

record_fields!(
    /// Current treatments: hydroxyurea, folic acid, prophylaxis, transfusions.
    TreatmentRecord, TreatmentPatch {
        hydroxyurea,
        tolerance,
        hydroxyurea_reasons,
        hydroxyurea_dosage,
        folic_acid,
        penicillin,
        regular_transfusion,
        transfusion_type,
        transfusion_frequency,
        last_transfusion_date,
        other_treatments,
    }
);

record_fields!(
    /// Medical history: subtype, diagnosis, crises and hospitalizations.
    ExamRecord, ExamPatch {
        sickle_type,
        diagnosis_age,
        diagnosis_circumstance,
        family_history,
        other_medical_history,
        previous_surgeries,
        allergies,
        vocs,
        hospitalizations,
    }
);

record_fields!(
    /// Psychosocial follow-up (step 5) and follow-up plan (step 7).
    ObservationRecord, ObservationPatch {
        impact_scolaire,
        accompagnement_psychologique,
        soutien_social,
        famille_informee,
        date_prochaine_consultation,
        education_therapeutique,
        date_prochaine_consultation_plan,
        plan_suivi_personnalise,
    }
);

impl SatelliteRecord for TreatmentRecord {
    const TABLE: &'static str = "consultation_treatments";
}

impl SatelliteRecord for ExamRecord {
    const TABLE: &'static str = "consultation_exams";
}

impl SatelliteRecord for ObservationRecord {
    const TABLE: &'static str = "consultation_observations";
}

/// Root consultation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Consultation {
    pub id: ConsultationId,
    #[serde(flatten)]
    pub fields: ConsultationFields,
    pub created_at: String,
    pub updated_at: String,
}

impl ConsultationFields {
    /// Planned exams, decoded from the stored JSON list.
    ///
    /// Falls back to the raw text as a single entry when the column holds
    /// something other than a list (e.g. the "RAS" sentinel).
    pub fn planned_exams(&self) -> Vec<String> {
        match self.examens_avant_consultation.as_deref() {
            None => Vec::new(),
            Some(raw) => serde_json::from_str::<Vec<String>>(raw)
                .unwrap_or_else(|_| vec![raw.to_string()]),
        }
    }
}
