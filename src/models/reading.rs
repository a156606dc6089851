use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Physiological bounds every reading must honor
// ═══════════════════════════════════════════

pub const HEART_RATE_MIN: i32 = 40;
pub const HEART_RATE_MAX: i32 = 200;
pub const SYSTOLIC_MIN: i32 = 80;
pub const SYSTOLIC_MAX: i32 = 220;
pub const DIASTOLIC_MIN: i32 = 40;
pub const PULSE_PRESSURE_MIN: i32 = 20;
pub const PULSE_PRESSURE_MAX: i32 = 60;
pub const SPO2_MIN: f64 = 85.0;
pub const SPO2_MAX: f64 = 100.0;
pub const TEMPERATURE_MIN: f64 = 35.0;
pub const TEMPERATURE_MAX: f64 = 42.0;
pub const STRESS_MAX: u8 = 100;
pub const HRV_MIN: f64 = 5.0;

/// One synthetic wearable measurement.
///
/// Optional fields model partial sensor capture. Systolic and diastolic
/// are always captured together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub subject_id: i64,
    pub device_id: i64,
    pub timestamp: NaiveDateTime,
    pub heart_rate: i32,
    pub systolic: Option<i32>,
    pub diastolic: Option<i32>,
    pub spo2: Option<f64>,
    pub temperature: Option<f64>,
    pub stress_index: u8,
    pub hrv: Option<f64>,
    pub status: bool,
}

impl Reading {
    /// Pulse pressure when both blood-pressure values were captured.
    pub fn pulse_pressure(&self) -> Option<i32> {
        match (self.systolic, self.diastolic) {
            (Some(sys), Some(dia)) => Some(sys - dia),
            _ => None,
        }
    }

    /// Names of the invariants this reading violates. Empty when valid.
    pub fn invariant_violations(
        &self,
        window_start: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Vec<&'static str> {
        let mut violations = Vec::new();

        if !(HEART_RATE_MIN..=HEART_RATE_MAX).contains(&self.heart_rate) {
            violations.push("heart_rate");
        }

        match (self.systolic, self.diastolic) {
            (Some(sys), Some(dia)) => {
                if !(SYSTOLIC_MIN..=SYSTOLIC_MAX).contains(&sys) {
                    violations.push("systolic");
                }
                if dia >= sys {
                    violations.push("diastolic_below_systolic");
                }
            }
            (None, None) => {}
            _ => violations.push("blood_pressure_pair"),
        }
        if let Some(pulse_pressure) = self.pulse_pressure() {
            if !(PULSE_PRESSURE_MIN..=PULSE_PRESSURE_MAX).contains(&pulse_pressure) {
                violations.push("pulse_pressure");
            }
        }

        if let Some(spo2) = self.spo2 {
            if !(SPO2_MIN..=SPO2_MAX).contains(&spo2) {
                violations.push("spo2");
            }
        }
        if let Some(temp) = self.temperature {
            if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&temp) {
                violations.push("temperature");
            }
        }
        if self.stress_index > STRESS_MAX {
            violations.push("stress_index");
        }
        if let Some(hrv) = self.hrv {
            if hrv < HRV_MIN || !hrv.is_finite() {
                violations.push("hrv");
            }
        }
        if self.timestamp < window_start || self.timestamp > now {
            violations.push("timestamp_window");
        }

        violations
    }
}

/// Round to a fixed number of decimals (NUMERIC column precision).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn valid_reading() -> Reading {
        Reading {
            subject_id: 1,
            device_id: 10,
            timestamp: at(12),
            heart_rate: 72,
            systolic: Some(118),
            diastolic: Some(78),
            spo2: Some(98.2),
            temperature: Some(36.7),
            stress_index: 30,
            hrv: Some(42.15),
            status: true,
        }
    }

    #[test]
    fn valid_reading_has_no_violations() {
        let r = valid_reading();
        assert!(r.invariant_violations(at(0), at(23)).is_empty());
        assert_eq!(r.pulse_pressure(), Some(40));
    }

    #[test]
    fn inverted_blood_pressure_detected() {
        let mut r = valid_reading();
        r.diastolic = Some(120);
        let v = r.invariant_violations(at(0), at(23));
        assert!(v.contains(&"diastolic_below_systolic"));
        assert!(v.contains(&"pulse_pressure"));
    }

    #[test]
    fn half_blood_pressure_detected() {
        let mut r = valid_reading();
        r.diastolic = None;
        assert_eq!(r.invariant_violations(at(0), at(23)), vec!["blood_pressure_pair"]);
    }

    #[test]
    fn out_of_window_timestamp_detected() {
        let r = valid_reading();
        assert_eq!(r.invariant_violations(at(13), at(23)), vec!["timestamp_window"]);
        assert_eq!(r.invariant_violations(at(0), at(11)), vec!["timestamp_window"]);
    }

    #[test]
    fn missing_optional_signals_are_valid() {
        let mut r = valid_reading();
        r.systolic = None;
        r.diastolic = None;
        r.spo2 = None;
        r.temperature = None;
        r.hrv = None;
        assert!(r.invariant_violations(at(0), at(23)).is_empty());
    }

    #[test]
    fn round_to_precision() {
        assert_eq!(round_to(36.749, 1), 36.7);
        assert_eq!(round_to(42.156, 2), 42.16);
    }
}
