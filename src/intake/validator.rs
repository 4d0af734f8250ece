//! Declarative field validation.
//!
//! Every rule of every declared field is evaluated; violations are collected
//! rather than short-circuited so the wizard can highlight all of them at
//! once. Messages are in French, as shown to clinic staff.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use super::sanitizer::unescape_html;
use super::vaccination::decode_checklist;
use super::ValidationErrors;
use crate::models::FieldMap;

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// Value must be present: not missing, `null`, `""`, `[]` or `false`.
    Required,
    /// Marker only: the field may be absent.
    Nullable,
    IsString,
    /// Maximum length in characters, measured on the unescaped text.
    MaxLength(usize),
    IsInteger,
    MinValue(i64),
    /// `YYYY-MM-DD`, and the parsed date must print back identically.
    Date,
    OneOf(&'static [&'static str]),
    Pattern(&'static LazyLock<Regex>),
    IsArray,
    /// Sanitized JSON text decoding to a vaccination checklist.
    Checklist,
}

/// Rules attached to one field of a step.
#[derive(Debug, Clone, Copy)]
pub struct FieldRules {
    pub field: &'static str,
    pub rules: &'static [Rule],
}

/// Validate a field map against a rule table.
///
/// Absent values (missing or `null`) only fail `Required`; every other
/// rule skips them.
pub fn validate(fields: &FieldMap, table: &[FieldRules]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    for entry in table {
        let value = fields.get(entry.field).unwrap_or(&Value::Null);
        for rule in entry.rules {
            // Checklist violations carry per-vaccine field names.
            if let (Rule::Checklist, Some(text)) = (rule, value.as_str()) {
                if let Err(inner) = decode_checklist(entry.field, &unescape_html(text)) {
                    errors.extend(inner);
                }
                continue;
            }
            if let Some(message) = check(entry.field, value, rule) {
                errors.add(entry.field, message);
            }
        }
    }
    errors.into_result()
}

/// Check one rule; returns the violation message, if any.
pub fn check(field: &str, value: &Value, rule: &Rule) -> Option<String> {
    let ok = match rule {
        Rule::Required => is_present(value),
        _ if value.is_null() => true,
        Rule::Nullable => true,
        Rule::IsString => value.is_string(),
        Rule::MaxLength(max) => scalar_text(value)
            .map(|text| unescape_html(&text).chars().count() <= *max)
            .unwrap_or(true),
        Rule::IsInteger => integer_value(value).is_some(),
        // Non-integers are reported by `IsInteger`, not here.
        Rule::MinValue(min) => integer_value(value).map_or(true, |n| n >= *min),
        Rule::Date => value.as_str().is_some_and(is_valid_date),
        Rule::OneOf(allowed) => scalar_text(value).is_some_and(|text| allowed.contains(&text.as_str())),
        Rule::Pattern(regex) => scalar_text(value).is_some_and(|text| regex.is_match(&text)),
        Rule::IsArray => value.is_array(),
        Rule::Checklist => value
            .as_str()
            .map_or(true, |text| decode_checklist(field, &unescape_html(text)).is_ok()),
    };
    if ok {
        return None;
    }

    Some(match rule {
        Rule::Required => format!("Le champ {field} est requis."),
        Rule::Nullable => format!("Le champ {field} est invalide."),
        Rule::IsString => format!("Le champ {field} doit être une chaîne de caractères."),
        Rule::MaxLength(max) => format!("Le champ {field} ne doit pas dépasser {max} caractères."),
        Rule::IsInteger => format!("Le champ {field} doit être un nombre entier."),
        Rule::MinValue(min) => format!("Le champ {field} doit être au moins {min}."),
        Rule::Date => format!("Le champ {field} doit être une date valide."),
        Rule::OneOf(allowed) => format!(
            "Le champ {field} doit être une des valeurs suivantes: {}",
            allowed.join(", ")
        ),
        Rule::Pattern(_) => format!("Le champ {field} n'est pas dans le format attendu."),
        Rule::IsArray => format!("Le champ {field} doit être un tableau."),
        Rule::Checklist => format!("Le champ {field} doit contenir un calendrier vaccinal valide."),
    })
}

/// `Required` semantics. The literal string `"0"` and the number `0`
/// count as present.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Strict `YYYY-MM-DD`: rejects `2024-2-3` and impossible dates like `2023-02-30`.
pub fn is_valid_date(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string() == text)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static NINE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{9}$").unwrap());

    fn map(value: Value) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    fn errors_for(value: Value, rule: Rule) -> Option<String> {
        check("field", &value, &rule)
    }

    #[test]
    fn required_rejects_blank_values() {
        for blank in [Value::Null, json!(""), json!([]), json!(false), json!({})] {
            assert!(errors_for(blank, Rule::Required).is_some());
        }
    }

    #[test]
    fn required_accepts_zero() {
        assert!(errors_for(json!("0"), Rule::Required).is_none());
        assert!(errors_for(json!(0), Rule::Required).is_none());
    }

    #[test]
    fn absent_values_skip_other_rules() {
        for rule in [
            Rule::IsString,
            Rule::MaxLength(1),
            Rule::IsInteger,
            Rule::Date,
            Rule::OneOf(&["Oui"]),
            Rule::IsArray,
            Rule::Pattern(&NINE_DIGITS),
        ] {
            assert!(errors_for(Value::Null, rule).is_none(), "{rule:?}");
        }
    }

    #[test]
    fn max_length_counts_characters_of_unescaped_text() {
        // "&amp;" is one character once unescaped
        assert!(errors_for(json!("a&amp;b"), Rule::MaxLength(3)).is_none());
        assert!(errors_for(json!("éééé"), Rule::MaxLength(4)).is_none());
        assert!(errors_for(json!("abcde"), Rule::MaxLength(4)).is_some());
    }

    #[test]
    fn integer_accepts_numbers_and_numeric_strings() {
        assert!(errors_for(json!(7), Rule::IsInteger).is_none());
        assert!(errors_for(json!("7"), Rule::IsInteger).is_none());
        assert!(errors_for(json!("7.5"), Rule::IsInteger).is_some());
        assert!(errors_for(json!(7.5), Rule::IsInteger).is_some());
        assert!(errors_for(json!("sept"), Rule::IsInteger).is_some());
    }

    #[test]
    fn min_value_does_not_double_report_non_integers() {
        assert!(errors_for(json!("abc"), Rule::MinValue(1)).is_none());
        assert!(errors_for(json!(0), Rule::MinValue(1)).is_some());
        assert!(errors_for(json!("1"), Rule::MinValue(1)).is_none());
    }

    #[test]
    fn date_is_strict_round_trip() {
        assert!(is_valid_date("2024-02-29"));
        assert!(!is_valid_date("2023-02-29"));
        assert!(!is_valid_date("2024-2-3"));
        assert!(!is_valid_date("03/02/2024"));
        assert!(errors_for(json!(20240101), Rule::Date).is_some());
    }

    #[test]
    fn one_of_lists_allowed_values() {
        let message = errors_for(json!("Peut-être"), Rule::OneOf(&["Oui", "Non"])).unwrap();
        assert_eq!(
            message,
            "Le champ field doit être une des valeurs suivantes: Oui, Non"
        );
        assert!(errors_for(json!("Oui"), Rule::OneOf(&["Oui", "Non"])).is_none());
    }

    #[test]
    fn pattern_matches_whole_value() {
        assert!(errors_for(json!("690001122"), Rule::Pattern(&NINE_DIGITS)).is_none());
        assert!(errors_for(json!("69000112"), Rule::Pattern(&NINE_DIGITS)).is_some());
    }

    #[test]
    fn validate_collects_all_violations() {
        static TABLE: &[FieldRules] = &[
            FieldRules { field: "full_name", rules: &[Rule::Required, Rule::IsString] },
            FieldRules { field: "age", rules: &[Rule::IsInteger, Rule::MinValue(0)] },
            FieldRules { field: "sex", rules: &[Rule::OneOf(&["M", "F"])] },
        ];
        let errors = validate(&map(json!({ "age": -2, "sex": "X" })), TABLE).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.messages("full_name"), &["Le champ full_name est requis.".to_string()]);
        assert_eq!(errors.messages("age"), &["Le champ age doit être au moins 0.".to_string()]);
    }

    #[test]
    fn validate_ignores_undeclared_fields() {
        static TABLE: &[FieldRules] = &[FieldRules { field: "fosa", rules: &[Rule::IsString] }];
        assert!(validate(&map(json!({ "fosa": "CHU", "other": 12 })), TABLE).is_ok());
    }

    #[test]
    fn checklist_rule_reports_free_text_and_entry_errors() {
        static TABLE: &[FieldRules] = &[FieldRules {
            field: "vaccination_data",
            rules: &[Rule::IsString, Rule::Checklist],
        }];
        let errors = validate(&map(json!({ "vaccination_data": "BCG fait" })), TABLE).unwrap_err();
        assert!(errors.contains("vaccination_data"));

        let text = r#"{"bcg":{"received":"Peut-être"}}"#;
        let errors = validate(&map(json!({ "vaccination_data": text })), TABLE).unwrap_err();
        assert!(errors.contains("vaccination_data.bcg.received"));

        // Sanitized (HTML-escaped) JSON text is still accepted
        let escaped = "{&quot;bcg&quot;:{&quot;selected&quot;:true}}";
        assert!(validate(&map(json!({ "vaccination_data": escaped })), TABLE).is_ok());
        assert!(errors_for(json!(escaped), Rule::Checklist).is_none());
    }
}
