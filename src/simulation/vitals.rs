//! Vital-sign generators.
//!
//! Six generators share one profile table and one circadian model. Within a
//! reading they run in dependency order: heart rate, stress, blood pressure
//! (needs heart rate), SpO2, temperature, HRV (needs stress). Each clamps its
//! own output to the physiological bounds in [`crate::models::reading`], so
//! generation never fails.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::circadian::CircadianModel;
use super::error::SimulationError;
use super::profile::ProfileTable;
use super::scheduler::DaySchedule;
use super::types::ProfileAssignment;
use crate::models::reading::*;
use crate::models::{RiskProfile, Sex};

// ═══════════════════════════════════════════
// Age and sex corrections
// ═══════════════════════════════════════════

/// Age bucket used for signal corrections (not for profile assignment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBucket {
    UpTo25,
    From26To35,
    From36To45,
    From46To55,
    From56To65,
    Over65,
}

impl AgeBucket {
    pub fn for_age(age: u32) -> Self {
        match age {
            0..=25 => Self::UpTo25,
            26..=35 => Self::From26To35,
            36..=45 => Self::From36To45,
            46..=55 => Self::From46To55,
            56..=65 => Self::From56To65,
            _ => Self::Over65,
        }
    }

    /// Resting heart-rate offset, bpm.
    pub fn heart_rate_offset(&self) -> f64 {
        match self {
            Self::UpTo25 => 0.0,
            Self::From26To35 => 2.0,
            Self::From36To45 => 4.0,
            Self::From46To55 => 6.0,
            Self::From56To65 => 8.0,
            Self::Over65 => 12.0,
        }
    }

    /// Systolic offset, mmHg.
    pub fn systolic_offset(&self) -> f64 {
        match self {
            Self::UpTo25 => -5.0,
            Self::From26To35 => 0.0,
            Self::From36To45 => 5.0,
            Self::From46To55 => 10.0,
            Self::From56To65 => 15.0,
            Self::Over65 => 20.0,
        }
    }

    /// Multiplicative HRV degradation.
    pub fn hrv_factor(&self) -> f64 {
        match self {
            Self::UpTo25 => 1.0,
            Self::From26To35 => 0.95,
            Self::From36To45 => 0.85,
            Self::From46To55 => 0.75,
            Self::From56To65 => 0.65,
            Self::Over65 => 0.55,
        }
    }
}

const FEMALE_HEART_RATE_OFFSET: f64 = 3.0;
const YOUNG_FEMALE_SYSTOLIC_OFFSET: f64 = -3.0;
const HORMONAL_CYCLE_DAYS: f64 = 28.0;
const HORMONAL_HEART_RATE_AMPLITUDE: f64 = 2.0;
const HORMONAL_TEMPERATURE_AMPLITUDE: f64 = 0.3;
const MALE_HRV_FACTOR: f64 = 0.92;

/// Subjects with a modeled hormonal cycle.
fn has_hormonal_cycle(sex: Sex, age: u32) -> bool {
    sex == Sex::Female && age < 50
}

fn hormonal_phase(day_of_month: u32) -> f64 {
    (2.0 * PI * day_of_month as f64 / HORMONAL_CYCLE_DAYS).sin()
}

/// Zero-mean Gaussian noise. A non-positive spread yields no noise.
fn gaussian<R: Rng + ?Sized>(rng: &mut R, std_dev: f64) -> f64 {
    if std_dev.is_nan() || std_dev <= 0.0 {
        return 0.0;
    }
    match Normal::new(0.0, std_dev) {
        Ok(normal) => normal.sample(rng),
        Err(_) => 0.0,
    }
}

// ═══════════════════════════════════════════
// Clamps — the last step of every generator
// ═══════════════════════════════════════════

pub fn clamp_heart_rate(value: f64) -> i32 {
    if !value.is_finite() {
        return HEART_RATE_MIN;
    }
    (value.round() as i32).clamp(HEART_RATE_MIN, HEART_RATE_MAX)
}

/// Enforce systolic bounds, diastolic below systolic and the pulse-pressure band.
pub fn clamp_blood_pressure(systolic: i32, diastolic: i32) -> (i32, i32) {
    let systolic = systolic.clamp(SYSTOLIC_MIN, SYSTOLIC_MAX);
    let pulse_pressure = (systolic - diastolic).clamp(PULSE_PRESSURE_MIN, PULSE_PRESSURE_MAX);
    let diastolic = (systolic - pulse_pressure).max(DIASTOLIC_MIN);
    (systolic, diastolic)
}

pub fn clamp_spo2(value: f64) -> f64 {
    if !value.is_finite() {
        return SPO2_MIN;
    }
    round_to(value.clamp(SPO2_MIN, SPO2_MAX), 1)
}

pub fn clamp_temperature(value: f64) -> f64 {
    if !value.is_finite() {
        return TEMPERATURE_MIN;
    }
    round_to(value.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX), 1)
}

pub fn clamp_stress(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, STRESS_MAX as f64) as u8
}

pub fn clamp_hrv(value: f64) -> f64 {
    if !value.is_finite() {
        return HRV_MIN;
    }
    round_to(value.max(HRV_MIN), 2)
}

// ═══════════════════════════════════════════
// Partial sensor capture
// ═══════════════════════════════════════════

/// Probability that each optional signal is captured in a reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRates {
    pub blood_pressure: f64,
    pub spo2: f64,
    pub temperature: f64,
    pub hrv: f64,
}

impl Default for CaptureRates {
    fn default() -> Self {
        Self {
            blood_pressure: 0.90,
            spo2: 0.95,
            temperature: 0.80,
            hrv: 0.98,
        }
    }
}

impl CaptureRates {
    pub fn validate(&self) -> Result<(), SimulationError> {
        for (name, rate) in [
            ("blood_pressure", self.blood_pressure),
            ("spo2", self.spo2),
            ("temperature", self.temperature),
            ("hrv", self.hrv),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimulationError::Config(format!(
                    "capture.{name} must be a probability, got {rate}"
                )));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════
// Per-day state
// ═══════════════════════════════════════════

/// Calendar facts and the coherent stress baseline for one subject-day.
#[derive(Debug, Clone)]
pub struct DayState {
    pub weekend: bool,
    pub day_of_month: u32,
    stress_baseline: Option<u8>,
}

impl DayState {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            day_of_month: date.day(),
            stress_baseline: None,
        }
    }

    pub fn stress_baseline(&self) -> Option<u8> {
        self.stress_baseline
    }
}

/// Weight of the daily baseline in each reading's stress value.
const STRESS_BASELINE_WEIGHT: f64 = 0.3;

// ═══════════════════════════════════════════
// Generator
// ═══════════════════════════════════════════

/// Produces correlated vital signs for a subject at a point in time.
#[derive(Debug, Clone)]
pub struct VitalSignGenerator {
    profiles: ProfileTable,
    circadian: CircadianModel,
    capture: CaptureRates,
}

impl VitalSignGenerator {
    pub fn new(profiles: ProfileTable, circadian: CircadianModel, capture: CaptureRates) -> Self {
        Self { profiles, circadian, capture }
    }

    pub fn generate_heart_rate<R: Rng + ?Sized>(
        &self,
        profile: RiskProfile,
        hour: u32,
        age: u32,
        sex: Sex,
        day_of_month: u32,
        rng: &mut R,
    ) -> i32 {
        let ranges = &self.profiles.ranges(profile).heart_rate;
        let phase = self.circadian.phase(hour);
        let band = if self.circadian.uses_activity_range(phase) {
            ranges.active
        } else {
            ranges.rest
        };

        let mut offset = AgeBucket::for_age(age).heart_rate_offset();
        if sex == Sex::Female {
            offset += FEMALE_HEART_RATE_OFFSET;
        }

        let mut hr = band.sample_shifted(rng, offset) * self.circadian.heart_rate_factor(phase);
        hr += gaussian(rng, hr * ranges.variation * 0.5);

        if has_hormonal_cycle(sex, age) {
            hr += HORMONAL_HEART_RATE_AMPLITUDE * hormonal_phase(day_of_month);
        }

        clamp_heart_rate(hr)
    }

    /// Systolic/diastolic pair. Diastolic is derived from systolic through a
    /// drawn pulse pressure, never sampled on its own.
    pub fn generate_blood_pressure<R: Rng + ?Sized>(
        &self,
        profile: RiskProfile,
        age: u32,
        sex: Sex,
        heart_rate: i32,
        rng: &mut R,
    ) -> (i32, i32) {
        let ranges = self.profiles.ranges(profile);
        let age_offset = AgeBucket::for_age(age).systolic_offset();

        let mut offset = age_offset;
        if sex == Sex::Female && age < 45 {
            offset += YOUNG_FEMALE_SYSTOLIC_OFFSET;
        }
        let mut systolic = ranges.systolic.sample_shifted(rng, offset);

        if heart_rate > 80 {
            systolic += (heart_rate - 80) as f64 * 0.3;
        }

        let pulse_pressure = rng.gen_range(30.0..=50.0);
        let band_shift = age_offset / 2.0;
        let mut diastolic = (systolic - pulse_pressure)
            .clamp(ranges.diastolic.min + band_shift, ranges.diastolic.max + band_shift);

        if age > 60 {
            let shift = ((age - 60) as f64 * 0.25).min(8.0);
            systolic += shift;
            diastolic += shift;
        }

        clamp_blood_pressure(systolic.round() as i32, diastolic.round() as i32)
    }

    pub fn generate_spo2<R: Rng + ?Sized>(
        &self,
        profile: RiskProfile,
        hour: u32,
        age: u32,
        rng: &mut R,
    ) -> f64 {
        let ranges = self.profiles.ranges(profile);
        let phase = self.circadian.phase(hour);

        let age_offset = if age > 65 {
            -1.0
        } else if age > 50 {
            -0.5
        } else {
            0.0
        };
        let noise = match profile {
            RiskProfile::Healthy => 0.3,
            RiskProfile::ModerateRisk => 0.6,
            RiskProfile::Pathological => 0.8,
        };

        let spo2 = ranges.spo2.sample(rng)
            + self.circadian.spo2_offset(phase)
            + age_offset
            + gaussian(rng, noise);
        clamp_spo2(spo2)
    }

    /// `hour` is fractional (14.5 = 14:30).
    pub fn generate_temperature<R: Rng + ?Sized>(
        &self,
        profile: RiskProfile,
        hour: f64,
        age: u32,
        sex: Sex,
        day_of_month: u32,
        rng: &mut R,
    ) -> f64 {
        let ranges = self.profiles.ranges(profile);
        let mut temp = ranges.temperature.sample(rng) + self.circadian.temperature_offset(hour);

        if has_hormonal_cycle(sex, age) {
            temp += HORMONAL_TEMPERATURE_AMPLITUDE * hormonal_phase(day_of_month);
        }
        // Less efficient thermoregulation
        if age > 70 {
            temp += gaussian(rng, 0.2);
        }
        temp += gaussian(rng, 0.1);

        clamp_temperature(temp)
    }

    pub fn generate_stress<R: Rng + ?Sized>(
        &self,
        profile: RiskProfile,
        hour: u32,
        age: u32,
        weekend: bool,
        rng: &mut R,
    ) -> u8 {
        let ranges = self.profiles.ranges(profile);
        let phase = self.circadian.phase(hour);

        let reactivity = if age > 60 {
            0.8
        } else if age < 30 {
            1.2
        } else {
            1.0
        };

        let base = ranges.stress.sample(rng);
        let stress = base * self.circadian.stress_factor(phase, weekend) * reactivity
            + gaussian(rng, base * 0.15);
        clamp_stress(stress)
    }

    pub fn generate_hrv<R: Rng + ?Sized>(
        &self,
        profile: RiskProfile,
        age: u32,
        sex: Sex,
        stress_index: u8,
        rng: &mut R,
    ) -> f64 {
        let ranges = self.profiles.ranges(profile);
        let stress_factor = (1.0 - stress_index as f64 / 200.0).max(0.4);
        let sex_factor = if sex == Sex::Male { MALE_HRV_FACTOR } else { 1.0 };

        let mut hrv = ranges.hrv.sample(rng)
            * AgeBucket::for_age(age).hrv_factor()
            * stress_factor
            * sex_factor;
        hrv += gaussian(rng, hrv * 0.1);
        clamp_hrv(hrv)
    }

    /// One full reading. The first call of a day also fixes the day's
    /// stress baseline in `day`.
    pub fn generate_reading<R: Rng + ?Sized>(
        &self,
        assignment: &ProfileAssignment,
        timestamp: NaiveDateTime,
        day: &mut DayState,
        rng: &mut R,
    ) -> Reading {
        let subject = &assignment.subject;
        let profile = assignment.profile;
        let hour = timestamp.hour();
        let fractional_hour = hour as f64 + timestamp.minute() as f64 / 60.0;

        let heart_rate =
            self.generate_heart_rate(profile, hour, subject.age, subject.sex, day.day_of_month, rng);

        let baseline = match day.stress_baseline {
            Some(b) => b,
            None => {
                let b = self.generate_stress(profile, 12, subject.age, day.weekend, rng);
                day.stress_baseline = Some(b);
                b
            }
        };
        let instant = self.generate_stress(profile, hour, subject.age, day.weekend, rng);
        let stress_index = clamp_stress(
            STRESS_BASELINE_WEIGHT * baseline as f64
                + (1.0 - STRESS_BASELINE_WEIGHT) * instant as f64,
        );

        let (systolic, diastolic) = if rng.gen_bool(self.capture.blood_pressure) {
            let (sys, dia) =
                self.generate_blood_pressure(profile, subject.age, subject.sex, heart_rate, rng);
            (Some(sys), Some(dia))
        } else {
            (None, None)
        };

        let spo2 = rng
            .gen_bool(self.capture.spo2)
            .then(|| self.generate_spo2(profile, hour, subject.age, rng));

        let temperature = rng.gen_bool(self.capture.temperature).then(|| {
            self.generate_temperature(
                profile,
                fractional_hour,
                subject.age,
                subject.sex,
                day.day_of_month,
                rng,
            )
        });

        let hrv = rng
            .gen_bool(self.capture.hrv)
            .then(|| self.generate_hrv(profile, subject.age, subject.sex, stress_index, rng));

        Reading {
            subject_id: subject.subject_id,
            device_id: subject.device_id,
            timestamp,
            heart_rate,
            systolic,
            diastolic,
            spo2,
            temperature,
            stress_index,
            hrv,
            status: true,
        }
    }

    /// Readings for a subject's whole schedule, day by day.
    pub fn generate_timeline<R: Rng + ?Sized>(
        &self,
        assignment: &ProfileAssignment,
        schedule: &[DaySchedule],
        rng: &mut R,
    ) -> Vec<Reading> {
        let total: usize = schedule.iter().map(|d| d.timestamps.len()).sum();
        let mut readings = Vec::with_capacity(total);
        for day in schedule {
            let mut state = DayState::for_date(day.date);
            for &ts in &day.timestamps {
                readings.push(self.generate_reading(assignment, ts, &mut state, rng));
            }
        }
        readings
    }
}

impl Default for VitalSignGenerator {
    fn default() -> Self {
        Self::new(ProfileTable::default(), CircadianModel::default(), CaptureRates::default())
    }
}
