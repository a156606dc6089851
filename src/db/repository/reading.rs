use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use super::cohort::SubjectRange;
use crate::db::DatabaseError;
use crate::models::Reading;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append readings as one atomic unit.
///
/// Either every row of the slice is committed or none is.
pub fn insert_readings_batch(conn: &Connection, readings: &[Reading]) -> Result<usize, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO readings
             (subject_id, device_id, measured_at, heart_rate, systolic, diastolic,
              spo2, temperature, stress_index, hrv, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for r in readings {
            stmt.execute(params![
                r.subject_id,
                r.device_id,
                r.timestamp.format(DATETIME_FORMAT).to_string(),
                r.heart_rate,
                r.systolic,
                r.diastolic,
                r.spo2,
                r.temperature,
                r.stress_index,
                r.hrv,
                r.status,
            ])?;
        }
    }
    // Dropping `tx` without commit rolls back.
    tx.commit()?;
    Ok(readings.len())
}

/// Delete readings, optionally only for a subject range. Returns rows removed.
///
/// Clearing an already-empty table is not an error.
pub fn clear_readings(conn: &Connection, range: Option<SubjectRange>) -> Result<usize, DatabaseError> {
    let removed = match range {
        Some(r) => conn.execute(
            "DELETE FROM readings WHERE subject_id BETWEEN ?1 AND ?2",
            params![r.from, r.to],
        )?,
        None => conn.execute("DELETE FROM readings", [])?,
    };
    tracing::info!(removed, scoped = range.is_some(), "Cleared readings");
    Ok(removed)
}

/// Count readings, optionally only for a subject range.
pub fn count_readings(conn: &Connection, range: Option<SubjectRange>) -> Result<i64, DatabaseError> {
    let (from, to) = match range {
        Some(r) => (r.from, r.to),
        None => (i64::MIN, i64::MAX),
    };
    let count = conn.query_row(
        "SELECT COUNT(*) FROM readings WHERE subject_id BETWEEN ?1 AND ?2",
        params![from, to],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// All readings of one subject in chronological order.
pub fn get_readings_for_subject(
    conn: &Connection,
    subject_id: i64,
) -> Result<Vec<Reading>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT subject_id, device_id, measured_at, heart_rate, systolic, diastolic,
                spo2, temperature, stress_index, hrv, status
         FROM readings
         WHERE subject_id = ?1
         ORDER BY measured_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![subject_id], row_to_reading)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

fn row_to_reading(row: &rusqlite::Row) -> Result<Reading, rusqlite::Error> {
    let measured_str: String = row.get(2)?;
    Ok(Reading {
        subject_id: row.get(0)?,
        device_id: row.get(1)?,
        timestamp: NaiveDateTime::parse_from_str(&measured_str, DATETIME_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?,
        heart_rate: row.get(3)?,
        systolic: row.get(4)?,
        diastolic: row.get(5)?,
        spo2: row.get(6)?,
        temperature: row.get(7)?,
        stress_index: row.get(8)?,
        hrv: row.get(9)?,
        status: row.get(10)?,
    })
}
