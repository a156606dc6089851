//! Run summary: profile distribution, signal completeness and ranges,
//! throughput, and a post-write invariant check.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::types::{ProfileAssignment, RunState};
use crate::db::SubjectRange;
use crate::models::{Reading, RiskProfile};

const RESTING_HEART_RATE_BELOW: i32 = 80;
const ELEVATED_HEART_RATE_FROM: i32 = 100;
const HYPERTENSIVE_SYSTOLIC_FROM: i32 = 140;
const HYPOXEMIC_SPO2_BELOW: f64 = 95.0;

/// Subjects assigned to one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileShare {
    pub profile: RiskProfile,
    pub subjects: usize,
    pub percentage: f64,
}

/// Observed range and capture count for one signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub captured: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SignalStats {
    fn observe(&mut self, value: f64) {
        self.captured += 1;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn observe_opt(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.observe(v);
        }
    }

    /// Share of readings carrying this signal, in percent.
    pub fn completeness(&self, total: usize) -> f64 {
        percentage(self.captured, total)
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Per-signal statistics over every committed reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub heart_rate: SignalStats,
    pub systolic: SignalStats,
    pub diastolic: SignalStats,
    pub spo2: SignalStats,
    pub temperature: SignalStats,
    pub stress_index: SignalStats,
    pub hrv: SignalStats,
}

impl SignalSummary {
    fn rows(&self) -> [(&'static str, &SignalStats); 7] {
        [
            ("heart_rate", &self.heart_rate),
            ("systolic", &self.systolic),
            ("diastolic", &self.diastolic),
            ("spo2", &self.spo2),
            ("temperature", &self.temperature),
            ("stress_index", &self.stress_index),
            ("hrv", &self.hrv),
        ]
    }
}

/// Readings past common screening thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalBreakdown {
    /// Heart rate below 80 bpm.
    pub resting_heart_rate: usize,
    /// Heart rate of 100 bpm or more.
    pub elevated_heart_rate: usize,
    /// Systolic of 140 mmHg or more.
    pub hypertensive: usize,
    /// SpO2 below 95%.
    pub hypoxemic: usize,
}

impl ClinicalBreakdown {
    fn observe(&mut self, r: &Reading) {
        if r.heart_rate < RESTING_HEART_RATE_BELOW {
            self.resting_heart_rate += 1;
        }
        if r.heart_rate >= ELEVATED_HEART_RATE_FROM {
            self.elevated_heart_rate += 1;
        }
        if r.systolic.is_some_and(|sys| sys >= HYPERTENSIVE_SYSTOLIC_FROM) {
            self.hypertensive += 1;
        }
        if r.spo2.is_some_and(|spo2| spo2 < HYPOXEMIC_SPO2_BELOW) {
            self.hypoxemic += 1;
        }
    }
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub state: RunState,
    pub seed: Option<u64>,
    pub subjects: usize,
    pub profiles: Vec<ProfileShare>,
    pub readings_written: usize,
    pub batches_committed: usize,
    pub signals: SignalSummary,
    pub clinical: ClinicalBreakdown,
    /// Lowest and highest subject id among written readings.
    pub subject_ids: Option<SubjectRange>,
    pub invariant_failures: usize,
    pub elapsed_ms: u64,
    pub readings_per_second: f64,
}

impl RunSummary {
    pub fn profile_share(&self, profile: RiskProfile) -> Option<&ProfileShare> {
        self.profiles.iter().find(|p| p.profile == profile)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} finished: {}", self.run_id, self.state)?;
        if let Some(seed) = self.seed {
            writeln!(f, "  seed: {seed}")?;
        }
        writeln!(f, "  subjects: {}", self.subjects)?;
        for share in &self.profiles {
            writeln!(
                f,
                "    {:<22} {:>6} ({:5.1}%)",
                share.profile.label(),
                share.subjects,
                share.percentage
            )?;
        }
        writeln!(
            f,
            "  readings: {} in {} batches, {:.1}s ({:.0}/s)",
            self.readings_written,
            self.batches_committed,
            self.elapsed_ms as f64 / 1000.0,
            self.readings_per_second
        )?;
        writeln!(f, "  signals:")?;
        for (name, stats) in self.signals.rows() {
            match (stats.min, stats.max) {
                (Some(min), Some(max)) => writeln!(
                    f,
                    "    {:<13} {:5.1}% complete, range {min}..{max}",
                    name,
                    stats.completeness(self.readings_written)
                )?,
                _ => writeln!(f, "    {name:<13} not captured")?,
            }
        }
        let total = self.readings_written;
        let clinical = &self.clinical;
        writeln!(f, "  clinical:")?;
        writeln!(
            f,
            "    heart rate <80 bpm    {:>8} ({:5.1}%)",
            clinical.resting_heart_rate,
            percentage(clinical.resting_heart_rate, total)
        )?;
        writeln!(
            f,
            "    heart rate >=100 bpm  {:>8} ({:5.1}%)",
            clinical.elevated_heart_rate,
            percentage(clinical.elevated_heart_rate, total)
        )?;
        writeln!(
            f,
            "    systolic >=140 mmHg   {:>8} ({:5.1}% of BP readings)",
            clinical.hypertensive,
            percentage(clinical.hypertensive, self.signals.systolic.captured)
        )?;
        writeln!(
            f,
            "    SpO2 <95%             {:>8} ({:5.1}% of SpO2 readings)",
            clinical.hypoxemic,
            percentage(clinical.hypoxemic, self.signals.spo2.captured)
        )?;
        if let Some(ids) = self.subject_ids {
            writeln!(f, "  subject ids: {}-{}", ids.from, ids.to)?;
        }
        write!(f, "  invariant failures: {}", self.invariant_failures)
    }
}

/// Builds a [`RunSummary`] incrementally as batches commit.
pub struct SummaryAccumulator {
    profile_counts: BTreeMap<RiskProfile, usize>,
    subjects: usize,
    windows: HashMap<(i64, i64), NaiveDateTime>,
    now: NaiveDateTime,
    readings: usize,
    signals: SignalSummary,
    clinical: ClinicalBreakdown,
    subject_ids: Option<SubjectRange>,
    invariant_failures: usize,
}

impl SummaryAccumulator {
    /// `window_start` gives each subject-device pair's earliest admissible
    /// timestamp.
    pub fn new(
        assignments: &[ProfileAssignment],
        window_start: impl Fn(&ProfileAssignment) -> NaiveDateTime,
        now: NaiveDateTime,
    ) -> Self {
        let mut profile_counts = BTreeMap::new();
        for profile in RiskProfile::all() {
            profile_counts.insert(*profile, 0);
        }
        let mut windows = HashMap::with_capacity(assignments.len());
        for a in assignments {
            *profile_counts.entry(a.profile).or_insert(0) += 1;
            windows.insert((a.subject.subject_id, a.subject.device_id), window_start(a));
        }
        Self {
            profile_counts,
            subjects: assignments.len(),
            windows,
            now,
            readings: 0,
            signals: SignalSummary::default(),
            clinical: ClinicalBreakdown::default(),
            subject_ids: None,
            invariant_failures: 0,
        }
    }

    pub fn observe(&mut self, batch: &[Reading]) {
        for r in batch {
            self.readings += 1;
            self.signals.heart_rate.observe(r.heart_rate as f64);
            self.signals.systolic.observe_opt(r.systolic.map(f64::from));
            self.signals.diastolic.observe_opt(r.diastolic.map(f64::from));
            self.signals.spo2.observe_opt(r.spo2);
            self.signals.temperature.observe_opt(r.temperature);
            self.signals.stress_index.observe(r.stress_index as f64);
            self.signals.hrv.observe_opt(r.hrv);
            self.clinical.observe(r);
            self.subject_ids = Some(match self.subject_ids {
                Some(ids) => SubjectRange {
                    from: ids.from.min(r.subject_id),
                    to: ids.to.max(r.subject_id),
                },
                None => SubjectRange { from: r.subject_id, to: r.subject_id },
            });

            let window_start = self
                .windows
                .get(&(r.subject_id, r.device_id))
                .copied()
                .unwrap_or(self.now);
            let violations = r.invariant_violations(window_start, self.now);
            if !violations.is_empty() {
                self.invariant_failures += 1;
                tracing::warn!(
                    subject_id = r.subject_id,
                    device_id = r.device_id,
                    timestamp = %r.timestamp,
                    ?violations,
                    "Reading failed verification"
                );
            }
        }
    }

    pub fn finish(
        self,
        run_id: String,
        state: RunState,
        seed: Option<u64>,
        batches_committed: usize,
        elapsed_ms: u64,
        readings_per_second: f64,
    ) -> RunSummary {
        let subjects = self.subjects;
        let profiles = self
            .profile_counts
            .into_iter()
            .map(|(profile, count)| ProfileShare {
                profile,
                subjects: count,
                percentage: percentage(count, subjects),
            })
            .collect();

        RunSummary {
            run_id,
            state,
            seed,
            subjects,
            profiles,
            readings_written: self.readings,
            batches_committed,
            signals: self.signals,
            clinical: self.clinical,
            subject_ids: self.subject_ids,
            invariant_failures: self.invariant_failures,
            elapsed_ms,
            readings_per_second,
        }
    }
}
