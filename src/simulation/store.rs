//! SQLite-backed implementations of the simulation traits.

use chrono::NaiveDate;
use rusqlite::Connection;

use super::error::SimulationError;
use super::traits::{CohortReader, ReadingStore};
use crate::db::{self, DatabaseError, SubjectRange};
use crate::models::{Reading, Subject};

/// Reads the cohort from the subjects, devices and health_profiles tables.
#[derive(Debug, Default)]
pub struct SqliteCohortReader;

impl SqliteCohortReader {
    pub fn new() -> Self {
        Self
    }
}

impl CohortReader for SqliteCohortReader {
    fn read_cohort(
        &self,
        conn: &Connection,
        range: Option<SubjectRange>,
        as_of: NaiveDate,
    ) -> Result<Vec<Subject>, SimulationError> {
        let cohort = db::load_cohort(conn, range, as_of)?;
        tracing::debug!(subjects = cohort.len(), ?range, "Cohort loaded");
        Ok(cohort)
    }
}

/// Appends readings to the readings table.
#[derive(Debug, Default)]
pub struct SqliteReadingStore;

impl SqliteReadingStore {
    pub fn new() -> Self {
        Self
    }
}

impl ReadingStore for SqliteReadingStore {
    fn insert_batch(&self, conn: &Connection, readings: &[Reading]) -> Result<usize, DatabaseError> {
        db::insert_readings_batch(conn, readings)
    }

    fn clear(&self, conn: &Connection, range: Option<SubjectRange>) -> Result<usize, SimulationError> {
        Ok(db::clear_readings(conn, range)?)
    }

    fn count(&self, conn: &Connection, range: Option<SubjectRange>) -> Result<i64, SimulationError> {
        Ok(db::count_readings(conn, range)?)
    }
}
