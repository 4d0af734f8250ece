use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::column_values;
use crate::db::DatabaseError;
use crate::models::*;

/// Insert an empty, time-stamped consultation row and return its id.
pub fn insert_consultation(conn: &Connection) -> Result<ConsultationId, DatabaseError> {
    conn.execute(
        "INSERT INTO consultations (created_at, updated_at)
         VALUES (datetime('now'), datetime('now'))",
        [],
    )?;
    Ok(ConsultationId(conn.last_insert_rowid()))
}

pub fn consultation_exists(conn: &Connection, id: ConsultationId) -> Result<bool, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM consultations WHERE id = ?1",
            params![id.0],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Fail with `NotFound` unless the consultation row exists.
pub fn require_consultation(conn: &Connection, id: ConsultationId) -> Result<(), DatabaseError> {
    if consultation_exists(conn, id)? {
        Ok(())
    } else {
        Err(not_found(id))
    }
}

pub fn get_consultation(
    conn: &Connection,
    id: ConsultationId,
) -> Result<Option<Consultation>, DatabaseError> {
    let columns = ConsultationFields::COLUMNS;
    let sql = format!(
        "SELECT {}, created_at, updated_at FROM consultations WHERE id = ?1",
        columns.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt
        .query_row(params![id.0], |row| {
            let mut fields = ConsultationFields::default();
            for (idx, column) in columns.iter().enumerate() {
                fields.set(column, row.get::<_, Option<String>>(idx)?);
            }
            Ok(Consultation {
                id,
                fields,
                created_at: row.get(columns.len())?,
                updated_at: row.get(columns.len() + 1)?,
            })
        })
        .optional()?;
    Ok(result)
}

/// Write every updatable column of an existing consultation.
pub fn update_consultation(
    conn: &Connection,
    id: ConsultationId,
    fields: &ConsultationFields,
) -> Result<(), DatabaseError> {
    let assignments: Vec<String> = ConsultationFields::COLUMNS
        .iter()
        .enumerate()
        .map(|(idx, column)| format!("{column} = ?{}", idx + 2))
        .collect();
    let sql = format!(
        "UPDATE consultations SET {}, updated_at = datetime('now') WHERE id = ?1",
        assignments.join(", ")
    );

    let mut values = vec![SqlValue::Integer(id.0)];
    values.extend(column_values(fields));

    let updated = conn.execute(&sql, params_from_iter(values))?;
    if updated == 0 {
        return Err(not_found(id));
    }
    Ok(())
}

/// Sparse update: merge the patch into the stored row, leaving columns the
/// patch does not carry untouched.
pub fn apply_consultation_patch(
    conn: &Connection,
    id: ConsultationId,
    patch: ConsultationPatch,
) -> Result<(), DatabaseError> {
    if patch.is_empty() {
        return Ok(());
    }
    let mut current = get_consultation(conn, id)?.ok_or_else(|| not_found(id))?;
    current.fields.apply(patch);
    update_consultation(conn, id, &current.fields)
}

pub(crate) fn not_found(id: ConsultationId) -> DatabaseError {
    DatabaseError::NotFound {
        entity_type: "Consultation".into(),
        id: id.to_string(),
    }
}
