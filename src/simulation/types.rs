use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::circadian::CircadianConfig;
use super::error::SimulationError;
use super::profile::ProfileTable;
use super::scheduler::ScheduleConfig;
use super::vitals::CaptureRates;
use crate::db::SubjectRange;
use crate::models::{RiskProfile, Subject};

// ═══════════════════════════════════════════
// Assignment
// ═══════════════════════════════════════════

/// A subject paired with the profile drawn for it. Lives for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileAssignment {
    pub subject: Subject,
    pub profile: RiskProfile,
}

// ═══════════════════════════════════════════
// Run state machine
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    ReadingCohort,
    Generating,
    Writing,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ReadingCohort => "reading_cohort",
            Self::Generating => "generating",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, ReadingCohort)
                | (Init, Failed)
                | (ReadingCohort, Generating)
                | (ReadingCohort, Failed)
                | (Generating, Writing)
                | (Generating, Failed)
                | (Writing, Done)
                | (Writing, Failed)
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════
// Progress events
// ═══════════════════════════════════════════

/// Emitted while a run progresses, for CLI or embedding callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    Started {
        run_id: String,
        subject_count: usize,
    },
    BatchCommitted {
        batch_index: usize,
        written: usize,
        total_written: usize,
        elapsed_ms: u64,
        readings_per_second: f64,
    },
    Completed {
        total_written: usize,
        elapsed_ms: u64,
    },
    Failed {
        error: String,
    },
}

// ═══════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════

/// Everything an operator can tune for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Days of history to generate, ending now.
    pub history_days: u32,
    /// Readings per committed batch.
    pub batch_size: usize,
    /// Inclusive subject-ID bounds, None = whole cohort.
    pub subject_range: Option<SubjectRange>,
    /// Clear existing readings in scope before generating.
    pub clear_first: bool,
    /// Fixed seed for a reproducible run.
    pub seed: Option<u64>,
    /// Generation threads. Writes always stay on the calling thread.
    pub workers: usize,
    pub capture: CaptureRates,
    pub schedule: ScheduleConfig,
    pub circadian: CircadianConfig,
    pub profiles: ProfileTable,
    /// Override for the end of the history window (tests, replays).
    pub now: Option<NaiveDateTime>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            history_days: 30,
            batch_size: 3000,
            subject_range: None,
            clear_first: false,
            seed: None,
            workers: 1,
            capture: CaptureRates::default(),
            schedule: ScheduleConfig::default(),
            circadian: CircadianConfig::default(),
            profiles: ProfileTable::default(),
            now: None,
        }
    }
}

pub const MAX_HISTORY_DAYS: u32 = 3650;
pub const MAX_WORKERS: usize = 64;

impl SimulationConfig {
    /// Reject anything that would make a run meaningless. Called before any
    /// database access.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.history_days == 0 || self.history_days > MAX_HISTORY_DAYS {
            return Err(SimulationError::Config(format!(
                "history_days must be in 1..={MAX_HISTORY_DAYS}, got {}",
                self.history_days
            )));
        }
        if self.batch_size == 0 {
            return Err(SimulationError::Config("batch_size must be at least 1".into()));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(SimulationError::Config(format!(
                "workers must be in 1..={MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if let Some(range) = self.subject_range {
            if range.from > range.to {
                return Err(SimulationError::Config(format!(
                    "subject range {}..{} is empty",
                    range.from, range.to
                )));
            }
        }
        self.capture.validate()?;
        self.schedule.validate()?;
        self.circadian.validate()?;
        self.profiles.validate()?;
        Ok(())
    }
}
