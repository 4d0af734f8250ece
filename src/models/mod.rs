pub mod enums;
pub mod records;
pub mod vaccination;

pub use enums::*;
pub use records::*;
pub use vaccination::*;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name → value mapping for one wizard step.
pub type FieldMap = serde_json::Map<String, Value>;

/// Identifier of a consultation, assigned when the first step is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsultationId(pub i64);

impl ConsultationId {
    /// Parse an identifier as sent by the wizard: a positive integer, either
    /// as a JSON number or as a string. `0`, `""` and anything else is "none".
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = match value {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse::<i64>().ok()?,
            _ => return None,
        };
        (id > 0).then_some(Self(id))
    }
}

impl std::fmt::Display for ConsultationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Text form of a field value, as stored in a TEXT column.
///
/// Strings are kept as-is, numbers and booleans are formatted, lists and
/// objects are JSON-encoded. `null` and missing keys yield `None`.
pub fn field_text(fields: &FieldMap, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1".into() } else { "0".into() }),
        Value::Number(n) => Some(n.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}
