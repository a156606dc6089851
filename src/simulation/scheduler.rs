//! MeasurementScheduler — when each subject gets measured.
//!
//! Produces per-day timestamp lists inside the history window
//! `[max(device_bound_at, now - history_days), now]`, weighted toward waking
//! hours and capped per hour so one subject never clusters readings.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::SimulationError;
use super::profile::ProfileTable;
use crate::models::{RiskProfile, Subject};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Scheduling knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Multiplier on the daily count for Saturdays and Sundays.
    pub weekend_factor: f64,
    /// Multiplier on the daily count for devices flagged inactive.
    pub inactive_device_factor: f64,
    /// Share of readings placed in waking hours.
    pub waking_share: f64,
    /// First waking hour (inclusive).
    pub waking_start_hour: u32,
    /// Last waking hour (inclusive).
    pub waking_end_hour: u32,
    pub max_readings_per_hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekend_factor: 0.7,
            inactive_device_factor: 0.5,
            waking_share: 0.8,
            waking_start_hour: 7,
            waking_end_hour: 22,
            max_readings_per_hour: 3,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.weekend_factor > 0.0 && self.weekend_factor <= 1.0) {
            return Err(SimulationError::Config("schedule.weekend_factor must be in (0, 1]".into()));
        }
        if !(self.inactive_device_factor > 0.0 && self.inactive_device_factor <= 1.0) {
            return Err(SimulationError::Config(
                "schedule.inactive_device_factor must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.waking_share) {
            return Err(SimulationError::Config("schedule.waking_share must be in [0, 1]".into()));
        }
        if self.waking_start_hour > self.waking_end_hour || self.waking_end_hour > 23 {
            return Err(SimulationError::Config(format!(
                "schedule: invalid waking hours {}-{}",
                self.waking_start_hour, self.waking_end_hour
            )));
        }
        if self.max_readings_per_hour == 0 {
            return Err(SimulationError::Config(
                "schedule.max_readings_per_hour must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn is_waking(&self, hour: u32) -> bool {
        (self.waking_start_hour..=self.waking_end_hour).contains(&hour)
    }
}

/// The part of one calendar day that lies inside a subject's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DayWindow {
    pub fn is_weekend(&self) -> bool {
        matches!(self.date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Fraction of the day covered, in (0, 1].
    pub fn coverage(&self) -> f64 {
        (((self.end - self.start).num_seconds() + 1) as f64 / SECONDS_PER_DAY).min(1.0)
    }

    /// Seconds `[lo, hi]` of `hour` that fall inside this window.
    fn hour_span(&self, hour: u32) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let hour_start = self.date.and_time(NaiveTime::from_hms_opt(hour, 0, 0)?);
        let hour_end = hour_start + Duration::seconds(3599);
        let lo = hour_start.max(self.start);
        let hi = hour_end.min(self.end);
        (lo <= hi).then_some((lo, hi))
    }
}

/// Timestamps for one subject-day, sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub timestamps: Vec<NaiveDateTime>,
}

pub struct MeasurementScheduler {
    config: ScheduleConfig,
    profiles: ProfileTable,
    history_days: u32,
    now: NaiveDateTime,
}

impl MeasurementScheduler {
    pub fn new(
        config: ScheduleConfig,
        profiles: ProfileTable,
        history_days: u32,
        now: NaiveDateTime,
    ) -> Self {
        Self { config, profiles, history_days, now }
    }

    /// Earliest admissible timestamp for this subject.
    pub fn window_start(&self, subject: &Subject) -> NaiveDateTime {
        let history_start = self.now - Duration::days(self.history_days as i64);
        subject.device_bound_at.max(history_start)
    }

    /// Calendar days overlapping the window, clipped to it. Empty when the
    /// device was bound after `now`.
    pub fn days_in_window(&self, subject: &Subject) -> Vec<DayWindow> {
        let start = self.window_start(subject);
        if start > self.now {
            return Vec::new();
        }

        let mut days = Vec::new();
        let mut date = start.date();
        while date <= self.now.date() {
            let day_start = date.and_time(NaiveTime::MIN);
            let day_end = day_start + Duration::seconds(86_399);
            days.push(DayWindow {
                date,
                start: day_start.max(start),
                end: day_end.min(self.now),
            });
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        days
    }

    /// Number of readings for one day before per-hour capping.
    pub fn readings_for_day<R: Rng + ?Sized>(
        &self,
        profile: RiskProfile,
        day: &DayWindow,
        device_active: bool,
        rng: &mut R,
    ) -> u32 {
        let range = self.profiles.ranges(profile).readings_per_day;
        let mut factor = 1.0;
        if day.is_weekend() {
            factor *= self.config.weekend_factor;
        }
        if !device_active {
            factor *= self.config.inactive_device_factor;
        }

        let min = (range.min as f64 * factor).round() as u32;
        let max = ((range.max as f64 * factor).round() as u32).max(min);
        let full_day = rng.gen_range(min..=max);

        (full_day as f64 * day.coverage()).round() as u32
    }

    /// Place `count` readings in the day, honoring the waking share and the
    /// per-hour cap. Returns fewer than `count` only when every available
    /// hour is full.
    pub fn schedule_day<R: Rng + ?Sized>(
        &self,
        day: &DayWindow,
        count: u32,
        rng: &mut R,
    ) -> Vec<NaiveDateTime> {
        let spans: Vec<(u32, (NaiveDateTime, NaiveDateTime))> = (0..24)
            .filter_map(|h| day.hour_span(h).map(|span| (h, span)))
            .collect();
        let mut waking: Vec<usize> = Vec::new();
        let mut night: Vec<usize> = Vec::new();
        for (i, (hour, _)) in spans.iter().enumerate() {
            if self.config.is_waking(*hour) {
                waking.push(i);
            } else {
                night.push(i);
            }
        }

        let cap = self.config.max_readings_per_hour;
        let count = count.min((spans.len() as u32).saturating_mul(cap));
        let mut used = vec![0u32; spans.len()];
        let mut timestamps = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let open_waking: Vec<usize> = waking.iter().copied().filter(|&i| used[i] < cap).collect();
            let open_night: Vec<usize> = night.iter().copied().filter(|&i| used[i] < cap).collect();

            let pool = match (open_waking.is_empty(), open_night.is_empty()) {
                (true, true) => break,
                (false, true) => &open_waking,
                (true, false) => &open_night,
                (false, false) => {
                    if rng.gen_bool(self.config.waking_share) {
                        &open_waking
                    } else {
                        &open_night
                    }
                }
            };

            let Some(&slot) = pool.choose(rng) else { break };
            let (lo, hi) = spans[slot].1;
            let offset = rng.gen_range(0..=(hi - lo).num_seconds());
            timestamps.push(lo + Duration::seconds(offset));
            used[slot] += 1;
        }

        timestamps.sort();
        timestamps
    }

    /// Full schedule for one subject, skipping days with no readings.
    pub fn schedule<R: Rng + ?Sized>(
        &self,
        subject: &Subject,
        profile: RiskProfile,
        rng: &mut R,
    ) -> Vec<DaySchedule> {
        self.days_in_window(subject)
            .into_iter()
            .filter_map(|day| {
                let count = self.readings_for_day(profile, &day, subject.device_active, rng);
                let timestamps = self.schedule_day(&day, count, rng);
                (!timestamps.is_empty()).then_some(DaySchedule { date: day.date, timestamps })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sex;
    use chrono::Timelike;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    // Tuesday
    fn now() -> NaiveDateTime {
        dt(2026, 3, 17, 14, 30)
    }

    fn subject(bound_at: NaiveDateTime, active: bool) -> Subject {
        Subject {
            subject_id: 1,
            age: 50,
            sex: Sex::Male,
            smoker: false,
            diabetic: false,
            hypertensive: false,
            cardiac_history: false,
            device_id: 1,
            device_bound_at: bound_at,
            device_active: active,
        }
    }

    fn scheduler(days: u32) -> MeasurementScheduler {
        MeasurementScheduler::new(ScheduleConfig::default(), ProfileTable::default(), days, now())
    }

    #[test]
    fn window_starts_at_later_of_binding_and_history() {
        let s = scheduler(30);
        let old = subject(dt(2024, 1, 1, 0, 0), true);
        assert_eq!(s.window_start(&old), now() - Duration::days(30));

        let recent = subject(dt(2026, 3, 10, 9, 15), true);
        assert_eq!(s.window_start(&recent), dt(2026, 3, 10, 9, 15));
    }

    #[test]
    fn days_clipped_at_both_edges() {
        let s = scheduler(30);
        let subj = subject(dt(2026, 3, 15, 20, 0), true);
        let days = s.days_in_window(&subj);
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].start, dt(2026, 3, 15, 20, 0));
        assert_eq!(days[2].end, now());
        assert_eq!(days[1].coverage(), 1.0);
        assert!(days[0].coverage() < 0.2);
    }

    #[test]
    fn device_bound_in_future_has_no_days() {
        let s = scheduler(30);
        let subj = subject(dt(2026, 4, 1, 0, 0), true);
        assert!(s.days_in_window(&subj).is_empty());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(s.schedule(&subj, RiskProfile::Healthy, &mut rng).is_empty());
    }

    #[test]
    fn every_timestamp_inside_window() {
        let s = scheduler(30);
        let mut rng = StdRng::seed_from_u64(9);
        for bound in [dt(2020, 1, 1, 0, 0), dt(2026, 3, 1, 13, 45), dt(2026, 3, 17, 9, 0)] {
            let subj = subject(bound, true);
            let start = s.window_start(&subj);
            for profile in RiskProfile::all() {
                for day in s.schedule(&subj, *profile, &mut rng) {
                    for ts in day.timestamps {
                        assert!(ts >= start && ts <= now(), "{ts} outside [{start}, {}]", now());
                        assert_eq!(ts.date(), day.date);
                    }
                }
            }
        }
    }

    #[test]
    fn per_hour_cap_respected() {
        let s = scheduler(14);
        let mut rng = StdRng::seed_from_u64(12);
        let subj = subject(dt(2020, 1, 1, 0, 0), true);
        for day in s.schedule(&subj, RiskProfile::Pathological, &mut rng) {
            let mut per_hour: HashMap<u32, u32> = HashMap::new();
            for ts in &day.timestamps {
                *per_hour.entry(ts.hour()).or_default() += 1;
            }
            assert!(per_hour.values().all(|&n| n <= 3), "{}: {per_hour:?}", day.date);
        }
    }

    #[test]
    fn cap_limits_a_tiny_window() {
        let s = scheduler(30);
        let mut rng = StdRng::seed_from_u64(3);
        let day = DayWindow {
            date: now().date(),
            start: dt(2026, 3, 17, 14, 0),
            end: now(),
        };
        let placed = s.schedule_day(&day, 40, &mut rng);
        assert_eq!(placed.len(), 3);
    }

    #[test]
    fn huge_count_bounded_by_hour_cap() {
        let s = scheduler(30);
        let mut rng = StdRng::seed_from_u64(6);
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let day = DayWindow {
            date,
            start: date.and_time(NaiveTime::MIN),
            end: date.and_hms_opt(23, 59, 59).unwrap(),
        };
        let placed = s.schedule_day(&day, u32::MAX, &mut rng);
        assert_eq!(placed.len(), 24 * 3);
    }

    #[test]
    fn waking_hours_dominate() {
        let s = scheduler(60);
        let mut rng = StdRng::seed_from_u64(21);
        let subj = subject(dt(2020, 1, 1, 0, 0), true);
        let all: Vec<NaiveDateTime> = s
            .schedule(&subj, RiskProfile::ModerateRisk, &mut rng)
            .into_iter()
            .flat_map(|d| d.timestamps)
            .collect();
        let waking = all.iter().filter(|t| (7..=22).contains(&t.hour())).count();
        let share = waking as f64 / all.len() as f64;
        assert!((0.72..=0.88).contains(&share), "waking share {share}");
    }

    #[test]
    fn weekend_and_inactive_days_get_fewer_readings() {
        let s = scheduler(30);
        let mut rng = StdRng::seed_from_u64(5);
        let full = |date: NaiveDate| DayWindow {
            date,
            start: date.and_time(NaiveTime::MIN),
            end: date.and_hms_opt(23, 59, 59).unwrap(),
        };
        let monday = full(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        let saturday = full(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());

        let mean = |day: &DayWindow, active: bool, rng: &mut StdRng| {
            (0..500)
                .map(|_| s.readings_for_day(RiskProfile::Healthy, day, active, rng) as f64)
                .sum::<f64>()
                / 500.0
        };
        let weekday = mean(&monday, true, &mut rng);
        assert!((12.0..=20.0).contains(&weekday));
        assert!(mean(&saturday, true, &mut rng) < weekday);
        assert!(mean(&monday, false, &mut rng) < weekday);
    }

    #[test]
    fn severity_increases_readings() {
        let s = scheduler(30);
        let mut rng = StdRng::seed_from_u64(8);
        let subj = subject(dt(2020, 1, 1, 0, 0), true);
        let total = |p, rng: &mut StdRng| -> usize {
            s.schedule(&subj, p, rng).iter().map(|d| d.timestamps.len()).sum()
        };
        assert!(total(RiskProfile::Healthy, &mut rng) < total(RiskProfile::Pathological, &mut rng));
    }

    #[test]
    fn timestamps_sorted_within_day() {
        let s = scheduler(5);
        let mut rng = StdRng::seed_from_u64(4);
        let subj = subject(dt(2020, 1, 1, 0, 0), true);
        for day in s.schedule(&subj, RiskProfile::Pathological, &mut rng) {
            assert!(day.timestamps.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn invalid_waking_hours_rejected() {
        let config = ScheduleConfig { waking_start_hour: 23, waking_end_hour: 7, ..Default::default() };
        assert!(config.validate().is_err());
        assert!(ScheduleConfig::default().validate().is_ok());
    }
}
