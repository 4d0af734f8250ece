use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::column_values;
use crate::db::DatabaseError;
use crate::models::*;

/// Load the satellite row of a consultation, if one was written.
pub fn get_satellite<R: SatelliteRecord>(
    conn: &Connection,
    id: ConsultationId,
) -> Result<Option<R>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE consultation_id = ?1",
        R::COLUMNS.join(", "),
        R::TABLE
    );
    let mut stmt = conn.prepare(&sql)?;
    let result = stmt
        .query_row(params![id.0], |row| {
            let mut record = R::default();
            for (idx, column) in R::COLUMNS.iter().enumerate() {
                record.set(column, row.get::<_, Option<String>>(idx)?);
            }
            Ok(record)
        })
        .optional()?;
    Ok(result)
}

/// Insert the satellite row, or overwrite the existing one for this
/// consultation. The primary key on `consultation_id` keeps it one-to-one.
pub fn upsert_satellite<R: SatelliteRecord>(
    conn: &Connection,
    id: ConsultationId,
    record: &R,
) -> Result<(), DatabaseError> {
    let columns = R::COLUMNS;
    let placeholders: Vec<String> = (0..columns.len()).map(|idx| format!("?{}", idx + 2)).collect();
    let updates: Vec<String> = columns
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect();
    let sql = format!(
        "INSERT INTO {table} (consultation_id, {columns}, created_at, updated_at)
         VALUES (?1, {placeholders}, datetime('now'), datetime('now'))
         ON CONFLICT(consultation_id) DO UPDATE SET {updates}, updated_at = datetime('now')",
        table = R::TABLE,
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
        updates = updates.join(", "),
    );

    let mut values = vec![SqlValue::Integer(id.0)];
    values.extend(column_values(record));
    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

/// Merge a patch into the satellite row (starting from an empty row when
/// none exists yet) and write it back.
pub fn apply_satellite_patch<R: SatelliteRecord>(
    conn: &Connection,
    id: ConsultationId,
    patch: R::Patch,
) -> Result<(), DatabaseError> {
    let mut record = get_satellite::<R>(conn, id)?.unwrap_or_default();
    record.apply(patch);
    upsert_satellite(conn, id, &record)
}

pub fn count_satellite_rows<R: SatelliteRecord>(
    conn: &Connection,
    id: ConsultationId,
) -> Result<i64, DatabaseError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE consultation_id = ?1", R::TABLE);
    let count = conn.query_row(&sql, params![id.0], |row| row.get(0))?;
    Ok(count)
}
