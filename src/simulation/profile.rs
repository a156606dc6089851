//! Risk profiles: per-profile signal ranges and the epidemiologically
//! weighted profile assignment.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::SimulationError;
use crate::models::{RiskProfile, Subject};

// ═══════════════════════════════════════════
// Signal ranges
// ═══════════════════════════════════════════

/// Most readings one subject can be scheduled for in a day.
pub const MAX_READINGS_PER_DAY: u32 = 288;

// Envelopes a configured range must fit inside.
const HEART_RATE_LIMITS: ValueRange = ValueRange::new(30.0, 220.0);
const SYSTOLIC_LIMITS: ValueRange = ValueRange::new(70.0, 250.0);
const DIASTOLIC_LIMITS: ValueRange = ValueRange::new(30.0, 150.0);
const SPO2_LIMITS: ValueRange = ValueRange::new(70.0, 100.0);
const TEMPERATURE_LIMITS: ValueRange = ValueRange::new(33.0, 43.0);
const STRESS_LIMITS: ValueRange = ValueRange::new(0.0, 100.0);
const HRV_LIMITS: ValueRange = ValueRange::new(0.0, 300.0);

/// Closed interval used for uniform draws.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Uniform draw, shifted by `offset`.
    pub fn sample_shifted<R: Rng + ?Sized>(&self, rng: &mut R, offset: f64) -> f64 {
        if self.max > self.min {
            rng.gen_range(self.min + offset..=self.max + offset)
        } else {
            self.min + offset
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.sample_shifted(rng, 0.0)
    }

    fn validate(&self, what: &str, limits: ValueRange) -> Result<(), SimulationError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(SimulationError::Config(format!("{what}: bounds must be finite")));
        }
        if self.min > self.max {
            return Err(SimulationError::Config(format!(
                "{what}: min {} exceeds max {}",
                self.min, self.max
            )));
        }
        if self.min < limits.min || self.max > limits.max {
            return Err(SimulationError::Config(format!(
                "{what}: [{}, {}] outside plausible range [{}, {}]",
                self.min, self.max, limits.min, limits.max
            )));
        }
        Ok(())
    }
}

/// Inclusive integer interval (readings per day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// Heart-rate intervals keyed by activity level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateRanges {
    pub rest: ValueRange,
    pub active: ValueRange,
    /// Relative spread of the Gaussian noise (0.08 = ±8%).
    pub variation: f64,
}

/// Everything a generator needs to know about one risk profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalRanges {
    pub heart_rate: HeartRateRanges,
    pub systolic: ValueRange,
    pub diastolic: ValueRange,
    pub spo2: ValueRange,
    pub temperature: ValueRange,
    pub stress: ValueRange,
    pub hrv: ValueRange,
    pub readings_per_day: CountRange,
}

impl SignalRanges {
    pub fn validate(&self, profile: RiskProfile) -> Result<(), SimulationError> {
        let p = profile.as_str();
        self.heart_rate.rest.validate(&format!("{p}.heart_rate.rest"), HEART_RATE_LIMITS)?;
        self.heart_rate.active.validate(&format!("{p}.heart_rate.active"), HEART_RATE_LIMITS)?;
        if !(0.0..1.0).contains(&self.heart_rate.variation) {
            return Err(SimulationError::Config(format!(
                "{p}.heart_rate.variation must be in [0, 1)"
            )));
        }
        self.systolic.validate(&format!("{p}.systolic"), SYSTOLIC_LIMITS)?;
        self.diastolic.validate(&format!("{p}.diastolic"), DIASTOLIC_LIMITS)?;
        self.spo2.validate(&format!("{p}.spo2"), SPO2_LIMITS)?;
        self.temperature.validate(&format!("{p}.temperature"), TEMPERATURE_LIMITS)?;
        self.stress.validate(&format!("{p}.stress"), STRESS_LIMITS)?;
        self.hrv.validate(&format!("{p}.hrv"), HRV_LIMITS)?;
        if self.readings_per_day.min > self.readings_per_day.max {
            return Err(SimulationError::Config(format!(
                "{p}.readings_per_day: min {} exceeds max {}",
                self.readings_per_day.min, self.readings_per_day.max
            )));
        }
        if self.readings_per_day.max > MAX_READINGS_PER_DAY {
            return Err(SimulationError::Config(format!(
                "{p}.readings_per_day: max {} exceeds {MAX_READINGS_PER_DAY}",
                self.readings_per_day.max
            )));
        }
        Ok(())
    }
}

/// Static range table for all three profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileTable {
    pub healthy: SignalRanges,
    pub moderate_risk: SignalRanges,
    pub pathological: SignalRanges,
}

impl ProfileTable {
    pub fn ranges(&self, profile: RiskProfile) -> &SignalRanges {
        match profile {
            RiskProfile::Healthy => &self.healthy,
            RiskProfile::ModerateRisk => &self.moderate_risk,
            RiskProfile::Pathological => &self.pathological,
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        for &profile in RiskProfile::all() {
            self.ranges(profile).validate(profile)?;
        }
        Ok(())
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self {
            // AHA resting rate, ESH/ESC optimal pressure
            healthy: SignalRanges {
                heart_rate: HeartRateRanges {
                    rest: ValueRange::new(55.0, 75.0),
                    active: ValueRange::new(70.0, 100.0),
                    variation: 0.08,
                },
                systolic: ValueRange::new(90.0, 120.0),
                diastolic: ValueRange::new(60.0, 80.0),
                spo2: ValueRange::new(97.0, 100.0),
                temperature: ValueRange::new(36.1, 37.2),
                stress: ValueRange::new(5.0, 35.0),
                hrv: ValueRange::new(30.0, 60.0),
                readings_per_day: CountRange::new(12, 20),
            },
            // Pre-hypertension (AHA 2017) or controlled risk factors
            moderate_risk: SignalRanges {
                heart_rate: HeartRateRanges {
                    rest: ValueRange::new(65.0, 85.0),
                    active: ValueRange::new(85.0, 115.0),
                    variation: 0.12,
                },
                systolic: ValueRange::new(120.0, 139.0),
                diastolic: ValueRange::new(80.0, 89.0),
                spo2: ValueRange::new(95.0, 98.0),
                temperature: ValueRange::new(36.0, 37.4),
                stress: ValueRange::new(25.0, 55.0),
                hrv: ValueRange::new(20.0, 40.0),
                readings_per_day: CountRange::new(18, 28),
            },
            // Grade 1-2 hypertension, diabetes or diagnosed cardiopathy
            pathological: SignalRanges {
                heart_rate: HeartRateRanges {
                    rest: ValueRange::new(75.0, 95.0),
                    active: ValueRange::new(95.0, 125.0),
                    variation: 0.15,
                },
                systolic: ValueRange::new(140.0, 165.0),
                diastolic: ValueRange::new(90.0, 105.0),
                spo2: ValueRange::new(92.0, 96.0),
                temperature: ValueRange::new(35.8, 37.6),
                stress: ValueRange::new(40.0, 75.0),
                hrv: ValueRange::new(10.0, 25.0),
                readings_per_day: CountRange::new(25, 40),
            },
        }
    }
}

// ═══════════════════════════════════════════
// Profile assignment
// ═══════════════════════════════════════════

/// Probability of each profile for one subject. Always sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileProbabilities {
    pub healthy: f64,
    pub moderate_risk: f64,
    pub pathological: f64,
}

impl ProfileProbabilities {
    /// Base prevalence before any age or comorbidity adjustment.
    pub const BASE: Self = Self { healthy: 0.65, moderate_risk: 0.25, pathological: 0.10 };

    fn normalized(self) -> Self {
        let total = self.healthy + self.moderate_risk + self.pathological;
        Self {
            healthy: self.healthy / total,
            moderate_risk: self.moderate_risk / total,
            pathological: self.pathological / total,
        }
    }

    pub fn get(&self, profile: RiskProfile) -> f64 {
        match profile {
            RiskProfile::Healthy => self.healthy,
            RiskProfile::ModerateRisk => self.moderate_risk,
            RiskProfile::Pathological => self.pathological,
        }
    }

    /// Inverse-CDF lookup of a uniform sample in [0, 1).
    pub fn sample(&self, u: f64) -> RiskProfile {
        if u < self.healthy {
            RiskProfile::Healthy
        } else if u < self.healthy + self.moderate_risk {
            RiskProfile::ModerateRisk
        } else {
            RiskProfile::Pathological
        }
    }
}

/// Age brackets: (exclusive upper age, [healthy, moderate, pathological]).
const AGE_BRACKETS: &[(u32, [f64; 3])] = &[
    (30, [0.80, 0.18, 0.02]),
    (45, [0.70, 0.25, 0.05]),
    (60, [0.55, 0.35, 0.10]),
    (75, [0.40, 0.45, 0.15]),
    (u32::MAX, [0.25, 0.50, 0.25]),
];

/// Additive shift with clamp: (delta, bound). Positive deltas cap at `bound`,
/// negative deltas floor at it.
#[derive(Debug, Clone, Copy)]
struct Shift {
    delta: f64,
    bound: f64,
}

impl Shift {
    const fn new(delta: f64, bound: f64) -> Self {
        Self { delta, bound }
    }

    fn apply(&self, p: f64) -> f64 {
        if self.delta >= 0.0 {
            (p + self.delta).min(self.bound)
        } else {
            (p + self.delta).max(self.bound)
        }
    }
}

/// [healthy, moderate, pathological] shifts by comorbidity pattern.
const CARDIAC_ONLY: [Shift; 3] =
    [Shift::new(-0.25, 0.15), Shift::new(0.15, 0.60), Shift::new(0.10, 0.25)];
const DIABETIC_ONLY: [Shift; 3] =
    [Shift::new(-0.20, 0.25), Shift::new(0.15, 0.55), Shift::new(0.05, 0.20)];
const OTHER_SINGLE: [Shift; 3] =
    [Shift::new(-0.15, 0.35), Shift::new(0.10, 0.50), Shift::new(0.05, 0.15)];
const MULTIPLE: [Shift; 3] =
    [Shift::new(-0.40, 0.05), Shift::new(0.15, 0.45), Shift::new(0.25, 0.50)];

/// Converts subject attributes into a risk profile by weighted sampling.
#[derive(Debug, Clone, Default)]
pub struct ProfileAssigner;

impl ProfileAssigner {
    pub fn new() -> Self {
        Self
    }

    /// Normalized probabilities for this subject.
    pub fn probabilities(&self, subject: &Subject) -> ProfileProbabilities {
        let [mut healthy, mut moderate, mut pathological] = AGE_BRACKETS
            .iter()
            .find(|(upper, _)| subject.age < *upper)
            .map(|(_, p)| *p)
            .unwrap_or([
                ProfileProbabilities::BASE.healthy,
                ProfileProbabilities::BASE.moderate_risk,
                ProfileProbabilities::BASE.pathological,
            ]);

        match subject.comorbidity_count() {
            0 => {
                healthy = (healthy + 0.15).min(0.90);
                moderate = (moderate - 0.10).max(0.08);
                pathological *= 0.5;
            }
            1 => {
                let shifts = if subject.cardiac_history {
                    &CARDIAC_ONLY
                } else if subject.diabetic {
                    &DIABETIC_ONLY
                } else {
                    &OTHER_SINGLE
                };
                healthy = shifts[0].apply(healthy);
                moderate = shifts[1].apply(moderate);
                pathological = shifts[2].apply(pathological);
            }
            _ => {
                healthy = MULTIPLE[0].apply(healthy);
                moderate = MULTIPLE[1].apply(moderate);
                pathological = MULTIPLE[2].apply(pathological);
            }
        }

        ProfileProbabilities { healthy, moderate_risk: moderate, pathological }.normalized()
    }

    /// Draw a profile for this subject.
    pub fn assign<R: Rng + ?Sized>(&self, subject: &Subject, rng: &mut R) -> RiskProfile {
        let probabilities = self.probabilities(subject);
        probabilities.sample(rng.gen::<f64>())
    }
}
