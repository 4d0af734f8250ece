//! Repository layer: record-scoped database operations.
//!
//! One root `consultations` table plus one-to-one satellites keyed by
//! `consultation_id`. All public functions are re-exported here.

mod consultation;
mod satellite;
mod vaccination;

use rusqlite::types::Value as SqlValue;

use crate::models::RecordFields;

pub use consultation::*;
pub use satellite::*;
pub use vaccination::*;

/// Column values of a record as SQLite parameters, in `COLUMNS` order.
pub(crate) fn column_values<R: RecordFields>(record: &R) -> Vec<SqlValue> {
    record
        .values()
        .into_iter()
        .map(|value| match value {
            Some(text) => SqlValue::Text(text.to_string()),
            None => SqlValue::Null,
        })
        .collect()
}
