//! Vaccination checklist input: per-vaccine sanitization and light checks.
//!
//! Used both by the standalone calendar form (`vaccines` object) and by
//! wizard step 6 (`vaccination_data`, the same object as JSON text).

use serde_json::Value;

use super::sanitizer::sanitize;
use super::validator::is_valid_date;
use super::ValidationErrors;
use crate::models::{
    AdministrationRoute, VaccinationChecklist, VaccineCode, VaccineEntry, YesNo,
};

/// Decode a checklist sent as JSON text (wizard step 6).
///
/// Undecodable text is reported on `field` itself, per-vaccine problems as
/// `field.code.attribute`.
pub fn decode_checklist(field: &str, text: &str) -> Result<VaccinationChecklist, ValidationErrors> {
    let Ok(decoded) = serde_json::from_str::<Value>(text) else {
        let mut errors = ValidationErrors::new();
        errors.add(field, format!("Le champ {field} doit contenir un calendrier vaccinal valide."));
        return Err(errors);
    };
    sanitize_checklist(&decoded).map_err(|inner| {
        let mut errors = ValidationErrors::new();
        errors.merge_prefixed(field, inner);
        errors
    })
}

/// Build a checklist from the raw `code → entry` object.
///
/// Unknown vaccine codes, answers other than Oui/Non, unknown administration
/// routes and malformed dates are reported per `code.field`.
pub fn sanitize_checklist(raw: &Value) -> Result<VaccinationChecklist, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut checklist = VaccinationChecklist::default();

    let Some(entries) = raw.as_object() else {
        errors.add("format", "Le calendrier vaccinal doit être un objet.");
        return Err(errors);
    };

    for (code, input) in entries {
        let Ok(vaccine) = code.parse::<VaccineCode>() else {
            errors.add(code.as_str(), "Vaccin inconnu.");
            continue;
        };
        let Some(input) = input.as_object() else {
            errors.add(code.as_str(), "Entrée de vaccination invalide.");
            continue;
        };

        let mut entry = VaccineEntry {
            selected: input.get("selected").is_some_and(is_truthy),
            ..Default::default()
        };

        if let Some(received) = text(input.get("received")) {
            match received.parse::<YesNo>() {
                Ok(answer) => entry.received = Some(answer),
                Err(_) => errors.add(
                    format!("{code}.received"),
                    "Le champ received doit être une des valeurs suivantes: Oui, Non",
                ),
            }
        }

        if let Some(date) = text(input.get("date")) {
            if is_valid_date(&date) {
                entry.date = Some(date);
            } else {
                errors.add(format!("{code}.date"), "Le champ date doit être une date valide.");
            }
        }

        entry.observations = text(input.get("observations"));

        for route in routes(input.get("administration")) {
            match route.parse::<AdministrationRoute>() {
                Ok(route) => {
                    entry.administration.insert(route);
                }
                Err(_) => errors.add(
                    format!("{code}.administration"),
                    format!("Voie d'administration inconnue: {route}"),
                ),
            }
        }

        checklist.0.insert(vaccine, entry);
    }

    errors.into_result().map(|()| checklist)
}

/// Checkbox semantics: `true`, non-zero numbers and non-empty strings other
/// than `"0"` are ticked.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && s != "0"
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Sanitized text of a scalar; absent when blank.
fn text(value: Option<&Value>) -> Option<String> {
    match sanitize(value?) {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Administration routes: a list of checkbox values, or a single value.
fn routes(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|item| text(Some(item))).collect(),
        Some(single) => text(Some(single)).into_iter().collect(),
        None => Vec::new(),
    }
}
