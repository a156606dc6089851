//! Circadian modulation: activity phase by hour and per-signal factors.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::error::SimulationError;

/// Activity phase of the day, derived from the hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityPhase {
    Sleep,
    Waking,
    ActiveMorning,
    Midday,
    ActiveAfternoon,
    Evening,
    PreSleep,
}

impl ActivityPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Waking => "waking",
            Self::ActiveMorning => "active_morning",
            Self::Midday => "midday",
            Self::ActiveAfternoon => "active_afternoon",
            Self::Evening => "evening",
            Self::PreSleep => "pre_sleep",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::ActiveMorning | Self::ActiveAfternoon)
    }
}

impl std::fmt::Display for ActivityPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase for an hour of day (0-23; larger values wrap).
pub fn phase_for_hour(hour: u32) -> ActivityPhase {
    match hour % 24 {
        0..=5 | 23 => ActivityPhase::Sleep,
        6..=7 => ActivityPhase::Waking,
        8..=11 => ActivityPhase::ActiveMorning,
        12..=14 => ActivityPhase::Midday,
        15..=18 => ActivityPhase::ActiveAfternoon,
        19..=21 => ActivityPhase::Evening,
        _ => ActivityPhase::PreSleep,
    }
}

const MAX_STRESS_MULTIPLIER: f64 = 3.0;

/// Tunable circadian parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircadianConfig {
    /// Fraction by which sleep depresses heart rate (0.20 = 20% lower).
    pub sleep_depression: f64,
    /// Half peak-to-trough swing of core temperature, in °C.
    pub temperature_amplitude: f64,
    /// Hour of the temperature peak; the trough sits 12 hours earlier.
    pub temperature_peak_hour: f64,
    pub weekday_stress_multiplier: f64,
    pub weekend_stress_multiplier: f64,
}

impl Default for CircadianConfig {
    fn default() -> Self {
        Self {
            sleep_depression: 0.20,
            temperature_amplitude: 0.4,
            temperature_peak_hour: 17.0,
            weekday_stress_multiplier: 1.0,
            weekend_stress_multiplier: 0.7,
        }
    }
}

impl CircadianConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(0.0..1.0).contains(&self.sleep_depression) {
            return Err(SimulationError::Config(
                "circadian.sleep_depression must be in [0, 1)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature_amplitude) {
            return Err(SimulationError::Config(
                "circadian.temperature_amplitude must be in [0, 1] °C".into(),
            ));
        }
        if !(0.0..24.0).contains(&self.temperature_peak_hour) {
            return Err(SimulationError::Config(
                "circadian.temperature_peak_hour must be in [0, 24)".into(),
            ));
        }
        if !(0.0..=MAX_STRESS_MULTIPLIER).contains(&self.weekday_stress_multiplier) {
            return Err(SimulationError::Config(format!(
                "circadian.weekday_stress_multiplier must be in [0, {MAX_STRESS_MULTIPLIER}]"
            )));
        }
        if self.weekend_stress_multiplier <= 0.0
            || self.weekend_stress_multiplier > self.weekday_stress_multiplier
        {
            return Err(SimulationError::Config(
                "circadian: weekend stress multiplier must be positive and not exceed the weekday one"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Maps time of day to per-signal modulation.
#[derive(Debug, Clone)]
pub struct CircadianModel {
    config: CircadianConfig,
}

impl CircadianModel {
    pub fn new(config: CircadianConfig) -> Self {
        Self { config }
    }

    pub fn phase(&self, hour: u32) -> ActivityPhase {
        phase_for_hour(hour)
    }

    /// Active phases draw heart rate from the light-activity interval.
    pub fn uses_activity_range(&self, phase: ActivityPhase) -> bool {
        phase.is_active()
    }

    /// Multiplier applied to the drawn heart rate.
    pub fn heart_rate_factor(&self, phase: ActivityPhase) -> f64 {
        match phase {
            ActivityPhase::Sleep => 1.0 - self.config.sleep_depression,
            ActivityPhase::Waking => 1.10,
            ActivityPhase::Midday => 1.05, // post-prandial
            _ => 1.0,
        }
    }

    /// Additive temperature offset for a fractional hour of day.
    ///
    /// Sinusoid peaking at `temperature_peak_hour`, trough 12 hours earlier.
    pub fn temperature_offset(&self, hour: f64) -> f64 {
        let phase_shift = self.config.temperature_peak_hour - 6.0;
        self.config.temperature_amplitude * (2.0 * PI * (hour - phase_shift) / 24.0).sin()
    }

    /// Cortisol-like stress multiplier: morning peak, midday dip, smaller
    /// afternoon rise, evening decline.
    pub fn stress_factor(&self, phase: ActivityPhase, weekend: bool) -> f64 {
        let by_phase = match phase {
            ActivityPhase::Sleep => 0.3,
            ActivityPhase::Waking => 1.4,
            ActivityPhase::ActiveMorning => 1.2,
            ActivityPhase::Midday => 0.9,
            ActivityPhase::ActiveAfternoon => 1.1,
            ActivityPhase::Evening | ActivityPhase::PreSleep => 0.6,
        };
        let by_day = if weekend {
            self.config.weekend_stress_multiplier
        } else {
            self.config.weekday_stress_multiplier
        };
        by_phase * by_day
    }

    /// Additive SpO2 offset in percentage points.
    pub fn spo2_offset(&self, phase: ActivityPhase) -> f64 {
        match phase {
            ActivityPhase::Sleep => -0.5,
            p if p.is_active() => 0.3,
            _ => 0.0,
        }
    }
}

impl Default for CircadianModel {
    fn default() -> Self {
        Self::new(CircadianConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_boundaries() {
        let expected = [
            (0, ActivityPhase::Sleep),
            (5, ActivityPhase::Sleep),
            (6, ActivityPhase::Waking),
            (7, ActivityPhase::Waking),
            (8, ActivityPhase::ActiveMorning),
            (11, ActivityPhase::ActiveMorning),
            (12, ActivityPhase::Midday),
            (14, ActivityPhase::Midday),
            (15, ActivityPhase::ActiveAfternoon),
            (18, ActivityPhase::ActiveAfternoon),
            (19, ActivityPhase::Evening),
            (21, ActivityPhase::Evening),
            (22, ActivityPhase::PreSleep),
            (23, ActivityPhase::Sleep),
        ];
        for (hour, phase) in expected {
            assert_eq!(phase_for_hour(hour), phase, "hour {hour}");
        }
    }

    #[test]
    fn sleep_depresses_heart_rate_and_stress() {
        let model = CircadianModel::default();
        let sleep_hr = model.heart_rate_factor(ActivityPhase::Sleep);
        assert!((0.75..=0.85).contains(&sleep_hr));
        assert!(sleep_hr < model.heart_rate_factor(ActivityPhase::ActiveMorning));
        assert!(
            model.stress_factor(ActivityPhase::Sleep, false)
                < model.stress_factor(ActivityPhase::ActiveAfternoon, false)
        );
    }

    #[test]
    fn temperature_trough_early_morning_peak_late_afternoon() {
        let model = CircadianModel::default();
        let samples: Vec<(f64, f64)> = (0..96)
            .map(|q| {
                let h = q as f64 / 4.0;
                (h, model.temperature_offset(h))
            })
            .collect();
        let (trough_h, trough) = samples.iter().cloned().fold((0.0, f64::MAX), |a, b| if b.1 < a.1 { b } else { a });
        let (peak_h, peak) = samples.iter().cloned().fold((0.0, f64::MIN), |a, b| if b.1 > a.1 { b } else { a });

        assert!((4.0..=6.0).contains(&trough_h), "trough at {trough_h}");
        assert!((16.0..=18.0).contains(&peak_h), "peak at {peak_h}");
        let amplitude = (peak - trough) / 2.0;
        assert!((0.3..=0.5).contains(&amplitude), "amplitude {amplitude}");
    }

    #[test]
    fn stress_double_peak() {
        let model = CircadianModel::default();
        let f = |p| model.stress_factor(p, false);
        assert!(f(ActivityPhase::Waking) > f(ActivityPhase::Midday));
        assert!(f(ActivityPhase::ActiveAfternoon) > f(ActivityPhase::Midday));
        assert!(f(ActivityPhase::ActiveAfternoon) < f(ActivityPhase::Waking));
        assert!(f(ActivityPhase::Evening) < f(ActivityPhase::ActiveAfternoon));
    }

    #[test]
    fn weekend_dampens_stress() {
        let model = CircadianModel::default();
        for hour in 0..24 {
            let phase = phase_for_hour(hour);
            assert!(model.stress_factor(phase, true) <= model.stress_factor(phase, false));
        }
    }

    #[test]
    fn weekend_above_weekday_rejected() {
        let config = CircadianConfig {
            weekend_stress_multiplier: 1.2,
            ..CircadianConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimulationError::Config(_))));
    }

    #[test]
    fn spo2_lower_in_sleep() {
        let model = CircadianModel::default();
        assert!(model.spo2_offset(ActivityPhase::Sleep) < 0.0);
        assert!(model.spo2_offset(ActivityPhase::ActiveMorning) > 0.0);
        assert_eq!(model.spo2_offset(ActivityPhase::Evening), 0.0);
    }
}
