use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::*;

/// Raw `vaccination_data` blob of a consultation.
pub fn get_vaccination_blob(
    conn: &Connection,
    id: ConsultationId,
) -> Result<Option<String>, DatabaseError> {
    let blob = conn
        .query_row(
            "SELECT vaccination_data FROM consultation_vaccinations WHERE consultation_id = ?1",
            params![id.0],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(blob)
}

pub fn get_vaccinations(
    conn: &Connection,
    id: ConsultationId,
) -> Result<VaccinationChecklist, DatabaseError> {
    Ok(get_vaccination_blob(conn, id)?
        .map(|blob| VaccinationChecklist::from_blob(&blob))
        .unwrap_or_default())
}

/// Insert or replace the vaccination blob of a consultation.
pub fn upsert_vaccination_blob(
    conn: &Connection,
    id: ConsultationId,
    blob: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO consultation_vaccinations (consultation_id, vaccination_data, created_at, updated_at)
         VALUES (?1, ?2, datetime('now'), datetime('now'))
         ON CONFLICT(consultation_id) DO UPDATE SET
            vaccination_data = excluded.vaccination_data,
            updated_at = datetime('now')",
        params![id.0, blob],
    )?;
    Ok(())
}

pub fn upsert_vaccinations(
    conn: &Connection,
    id: ConsultationId,
    checklist: &VaccinationChecklist,
) -> Result<(), DatabaseError> {
    upsert_vaccination_blob(conn, id, &checklist.to_blob()?)
}
