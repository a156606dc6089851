use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;
use crate::models::{age_on, Sex, Subject};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inclusive subject-ID bounds for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRange {
    pub from: i64,
    pub to: i64,
}

/// Everything needed to register one monitored subject with a bound device.
#[derive(Debug, Clone)]
pub struct CohortMember {
    pub date_of_birth: NaiveDate,
    pub sex: Option<Sex>,
    pub smoker: Option<bool>,
    pub diabetic: Option<bool>,
    pub hypertensive: Option<bool>,
    pub cardiac_history: Option<bool>,
    pub device_serial: String,
    pub device_bound_at: NaiveDateTime,
    pub device_active: Option<bool>,
}

/// IDs created for a registered cohort member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberIds {
    pub subject_id: i64,
    pub device_id: i64,
}

/// Insert a subject, its health profile and its device in one transaction.
pub fn insert_cohort_member(
    conn: &Connection,
    member: &CohortMember,
) -> Result<MemberIds, DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO subjects (date_of_birth, sex) VALUES (?1, ?2)",
        params![
            member.date_of_birth.format(DATE_FORMAT).to_string(),
            member.sex.map(|s| s.as_str()),
        ],
    )?;
    let subject_id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO health_profiles (subject_id, smoker, diabetic, hypertensive, cardiac_history)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            subject_id,
            member.smoker,
            member.diabetic,
            member.hypertensive,
            member.cardiac_history,
        ],
    )?;

    tx.execute(
        "INSERT INTO devices (subject_id, serial_number, bound_at, active)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            subject_id,
            member.device_serial,
            member.device_bound_at.format(DATETIME_FORMAT).to_string(),
            member.device_active,
        ],
    )?;
    let device_id = tx.last_insert_rowid();

    tx.commit()?;
    Ok(MemberIds { subject_id, device_id })
}

/// Bind an additional device to an existing subject.
pub fn insert_device(
    conn: &Connection,
    subject_id: i64,
    serial: &str,
    bound_at: NaiveDateTime,
    active: Option<bool>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO devices (subject_id, serial_number, bound_at, active)
         VALUES (?1, ?2, ?3, ?4)",
        params![subject_id, serial, bound_at.format(DATETIME_FORMAT).to_string(), active],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Soft-delete a subject (excluded from every future cohort).
pub fn soft_delete_subject(conn: &Connection, subject_id: i64) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE subjects SET deleted = 1 WHERE id = ?1",
        params![subject_id],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "subject".into(),
            id: subject_id.to_string(),
        });
    }
    Ok(())
}

/// Soft-delete a device.
pub fn soft_delete_device(conn: &Connection, device_id: i64) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE devices SET deleted = 1 WHERE id = ?1",
        params![device_id],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "device".into(),
            id: device_id.to_string(),
        });
    }
    Ok(())
}

/// Load every eligible subject with its current device, ordered by subject id.
///
/// A subject with several devices is measured through one of them: active
/// before inactive, then the most recently bound. Soft-deleted subjects and
/// devices are excluded. Missing health-profile flags read as false; a
/// missing device `active` flag reads as true.
pub fn load_cohort(
    conn: &Connection,
    range: Option<SubjectRange>,
    as_of: NaiveDate,
) -> Result<Vec<Subject>, DatabaseError> {
    let (from, to) = match range {
        Some(r) => (r.from, r.to),
        None => (i64::MIN, i64::MAX),
    };

    let mut stmt = conn.prepare(
        "SELECT s.id, s.date_of_birth, s.sex,
                hp.smoker, hp.diabetic, hp.hypertensive, hp.cardiac_history,
                d.id, d.bound_at, d.active
         FROM devices d
         INNER JOIN subjects s ON d.subject_id = s.id
         LEFT JOIN health_profiles hp ON hp.subject_id = s.id AND hp.deleted = 0
         WHERE s.deleted = 0
           AND s.id BETWEEN ?1 AND ?2
           AND d.id = (
               SELECT d2.id FROM devices d2
               WHERE d2.subject_id = s.id AND d2.deleted = 0
               ORDER BY COALESCE(d2.active, 1) DESC, d2.bound_at DESC, d2.id DESC
               LIMIT 1
           )
         ORDER BY s.id",
    )?;

    let rows = stmt.query_map(params![from, to], |row| {
        Ok(CohortRow {
            subject_id: row.get(0)?,
            date_of_birth: row.get(1)?,
            sex: row.get(2)?,
            smoker: row.get(3)?,
            diabetic: row.get(4)?,
            hypertensive: row.get(5)?,
            cardiac_history: row.get(6)?,
            device_id: row.get(7)?,
            bound_at: row.get(8)?,
            active: row.get(9)?,
        })
    })?;

    let mut subjects = Vec::new();
    for row in rows {
        subjects.push(row?.into_subject(as_of)?);
    }
    Ok(subjects)
}

/// Count eligible subjects (distinct, not devices).
pub fn count_eligible_subjects(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(DISTINCT s.id)
         FROM devices d
         INNER JOIN subjects s ON d.subject_id = s.id
         WHERE s.deleted = 0 AND d.deleted = 0",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Lowest and highest eligible subject id, if any.
pub fn eligible_subject_bounds(conn: &Connection) -> Result<Option<SubjectRange>, DatabaseError> {
    let bounds = conn
        .query_row(
            "SELECT MIN(s.id), MAX(s.id)
             FROM devices d
             INNER JOIN subjects s ON d.subject_id = s.id
             WHERE s.deleted = 0 AND d.deleted = 0",
            [],
            |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
        )
        .optional()?;

    Ok(match bounds {
        Some((Some(from), Some(to))) => Some(SubjectRange { from, to }),
        _ => None,
    })
}

struct CohortRow {
    subject_id: i64,
    date_of_birth: String,
    sex: Option<String>,
    smoker: Option<bool>,
    diabetic: Option<bool>,
    hypertensive: Option<bool>,
    cardiac_history: Option<bool>,
    device_id: i64,
    bound_at: String,
    active: Option<bool>,
}

impl CohortRow {
    fn into_subject(self, as_of: NaiveDate) -> Result<Subject, DatabaseError> {
        let date_of_birth = NaiveDate::parse_from_str(&self.date_of_birth, DATE_FORMAT)
            .map_err(|_| DatabaseError::ConstraintViolation(format!(
                "subject {} has malformed date_of_birth '{}'",
                self.subject_id, self.date_of_birth
            )))?;
        let device_bound_at = NaiveDateTime::parse_from_str(&self.bound_at, DATETIME_FORMAT)
            .map_err(|_| DatabaseError::ConstraintViolation(format!(
                "device {} has malformed bound_at '{}'",
                self.device_id, self.bound_at
            )))?;

        // Unknown or unrecorded sex falls back to female, as the upstream seeders did.
        let sex = match self.sex.as_deref() {
            Some(raw) => Sex::from_str(raw).unwrap_or_else(|_| {
                tracing::debug!(subject_id = self.subject_id, sex = raw, "Unrecognized sex, using female");
                Sex::Female
            }),
            None => Sex::Female,
        };

        Ok(Subject {
            subject_id: self.subject_id,
            age: age_on(date_of_birth, as_of),
            sex,
            smoker: self.smoker.unwrap_or(false),
            diabetic: self.diabetic.unwrap_or(false),
            hypertensive: self.hypertensive.unwrap_or(false),
            cardiac_history: self.cardiac_history.unwrap_or(false),
            device_id: self.device_id,
            device_bound_at,
            device_active: self.active.unwrap_or(true),
        })
    }
}
