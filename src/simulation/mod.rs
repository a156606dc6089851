//! Synthetic vital-sign generation
//!
//! Populates the readings table with physiologically coherent wearable data
//! for every eligible subject in the cohort.
//!
//! ## Pipeline
//!
//! ```text
//! CohortReader → ProfileAssigner → MeasurementScheduler → VitalSignGenerator → BatchWriter
//!                                          ↑                      ↑
//!                                    profile table         CircadianModel
//! ```
//!
//! - Profiles are drawn once per subject from age and comorbidity weights.
//! - Every signal is clamped to physiological bounds; generation never fails.
//! - Batches commit independently; a failure keeps earlier batches.
//! - A fixed seed reproduces a run exactly, whatever the worker count.

pub mod error;
pub mod types;
pub mod traits;
pub mod profile;
pub mod circadian;
pub mod vitals;
pub mod scheduler;
pub mod store;
pub mod writer;
pub mod report;
pub mod runner;
pub mod cohort;

pub use error::SimulationError;
pub use types::*;
pub use traits::*;
pub use profile::{ProfileAssigner, ProfileProbabilities, ProfileTable, SignalRanges, ValueRange};
pub use circadian::{phase_for_hour, ActivityPhase, CircadianConfig, CircadianModel};
pub use vitals::{CaptureRates, DayState, VitalSignGenerator};
pub use scheduler::{DaySchedule, MeasurementScheduler, ScheduleConfig};
pub use store::{SqliteCohortReader, SqliteReadingStore};
pub use writer::{BatchWriter, WriteOutcome};
pub use report::{RunSummary, SignalStats};
pub use runner::SimulationRunner;
pub use cohort::seed_demo_cohort;
