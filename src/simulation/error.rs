//! Error types for a simulation run.
//!
//! Generation itself never fails (every signal is clamped); errors come from
//! configuration, the cohort query, or persistence.

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No eligible subjects in the requested range")]
    EmptyCohort,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Batch {batch_index} (readings from offset {offset}) failed to persist: {source}")]
    Persistence {
        batch_index: usize,
        offset: usize,
        #[source]
        source: DatabaseError,
    },

    #[error("Run cancelled after {committed} readings were committed")]
    Cancelled { committed: usize },
}

impl SimulationError {
    /// Whether the run failed before anything was written.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::EmptyCohort)
    }
}
