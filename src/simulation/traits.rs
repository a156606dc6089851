//! Trait definitions for the simulation's storage boundaries.
//!
//! Two traits keep the generator independent of the schema:
//! - CohortReader: eligible (subject, device) pairs
//! - ReadingStore: append-only batch persistence plus explicit clearing

use chrono::NaiveDate;
use rusqlite::Connection;

use super::error::SimulationError;
use crate::db::{DatabaseError, SubjectRange};
use crate::models::{Reading, Subject};

/// Supplies the cohort for a run.
pub trait CohortReader: Send + Sync {
    /// Eligible subjects ordered by id, ages computed on `as_of`.
    fn read_cohort(
        &self,
        conn: &Connection,
        range: Option<SubjectRange>,
        as_of: NaiveDate,
    ) -> Result<Vec<Subject>, SimulationError>;
}

/// Persists generated readings.
pub trait ReadingStore: Send + Sync {
    /// Append one batch atomically. The raw database error is returned so the
    /// writer can attach the batch position.
    fn insert_batch(&self, conn: &Connection, readings: &[Reading]) -> Result<usize, DatabaseError>;

    /// Delete readings in scope. Idempotent.
    fn clear(&self, conn: &Connection, range: Option<SubjectRange>) -> Result<usize, SimulationError>;

    fn count(&self, conn: &Connection, range: Option<SubjectRange>) -> Result<i64, SimulationError>;
}
