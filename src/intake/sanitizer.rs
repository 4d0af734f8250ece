//! Input normalization applied to every field before validation.
//!
//! Never fails: anything that cannot be normalized becomes `null`, which the
//! rest of the pipeline treats as "absent".

use serde_json::Value;

use crate::models::FieldMap;

/// Cameroon country calling code, stripped from international numbers.
const COUNTRY_CODE: &str = "237";

/// Subscriber numbers are exactly nine digits.
const PHONE_DIGITS: usize = 9;

/// Recursively trim and HTML-escape strings. Strings that are empty after
/// trimming become `null`; numbers, booleans and `null` pass through.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::String(escape_html(trimmed))
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(sanitize_fields(map)),
        other => other.clone(),
    }
}

pub fn sanitize_fields(fields: &FieldMap) -> FieldMap {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), sanitize(value)))
        .collect()
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse of [`escape_html`], for rendering stored values as plain text.
pub fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Normalize a phone number to its nine subscriber digits.
///
/// Non-digits are stripped and a leading `237` country code is dropped.
/// Anything that does not leave exactly nine digits yields `None`.
pub fn sanitize_phone(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let local = match digits.strip_prefix(COUNTRY_CODE) {
        Some(rest) if digits.len() == COUNTRY_CODE.len() + PHONE_DIGITS => rest,
        _ => digits.as_str(),
    };
    (local.len() == PHONE_DIGITS).then(|| local.to_string())
}

/// Sanitize each item of a list and drop the ones that end up absent.
/// Returns `None` when the value is not a list.
pub fn sanitize_list(value: &Value) -> Option<Vec<Value>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .map(sanitize)
            .filter(|item| !item.is_null())
            .collect(),
    )
}

/// Whether a sanitized value counts as "nothing entered".
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_trimmed_and_escaped() {
        assert_eq!(sanitize(&json!("  Jean  ")), json!("Jean"));
        assert_eq!(
            sanitize(&json!("<b>\"O'Neil\" & co</b>")),
            json!("&lt;b&gt;&quot;O&#039;Neil&quot; &amp; co&lt;/b&gt;")
        );
    }

    #[test]
    fn blank_strings_become_null() {
        assert_eq!(sanitize(&json!("   ")), Value::Null);
        assert_eq!(sanitize(&json!("")), Value::Null);
    }

    #[test]
    fn nested_values_are_sanitized() {
        let input = json!({
            "a": [" x ", "", 3],
            "b": { "c": " <y> " },
            "d": true,
        });
        assert_eq!(
            sanitize(&input),
            json!({
                "a": ["x", null, 3],
                "b": { "c": "&lt;y&gt;" },
                "d": true,
            })
        );
    }

    #[test]
    fn unescape_reverses_escape() {
        let raw = "Tom & \"Jerry\" <3 l'été";
        assert_eq!(unescape_html(&escape_html(raw)), raw);
        // Already-escaped entities are not double-decoded.
        assert_eq!(unescape_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn phone_keeps_nine_digits() {
        assert_eq!(sanitize_phone(&json!("690 00 11 22")).as_deref(), Some("690001122"));
        assert_eq!(sanitize_phone(&json!(690001122)).as_deref(), Some("690001122"));
    }

    #[test]
    fn phone_drops_country_code() {
        assert_eq!(
            sanitize_phone(&json!("+237 690-00-11-22")).as_deref(),
            Some("690001122")
        );
    }

    #[test]
    fn phone_rejects_wrong_length() {
        assert_eq!(sanitize_phone(&json!("12345")), None);
        assert_eq!(sanitize_phone(&json!("2376900011")), None);
        assert_eq!(sanitize_phone(&json!("")), None);
        assert_eq!(sanitize_phone(&Value::Null), None);
    }

    #[test]
    fn list_drops_absent_items() {
        assert_eq!(
            sanitize_list(&json!([" NFS ", "", null, "CRP"])),
            Some(vec![json!("NFS"), json!("CRP")])
        );
        assert_eq!(sanitize_list(&json!("NFS")), None);
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(None));
        assert!(is_blank(Some(&Value::Null)));
        assert!(is_blank(Some(&json!([]))));
        assert!(!is_blank(Some(&json!(0))));
        assert!(!is_blank(Some(&json!("0"))));
    }
}
