//! Demo cohort seeding.
//!
//! Fills the subject, health-profile and device tables with plausible
//! synthetic people so the generator can run against a self-contained
//! database. Comorbidity prevalences follow national survey figures scaled
//! by age and sex, with the usual co-occurrences (diabetes with
//! hypertension, hypertension or smoking with cardiac history).

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rand::Rng;
use rusqlite::Connection;
use uuid::Uuid;

use super::error::SimulationError;
use crate::db::{insert_cohort_member, insert_device, CohortMember, MemberIds};
use crate::models::Sex;

pub const DEMO_MIN_AGE: u32 = 18;
pub const DEMO_MAX_AGE: u32 = 90;
pub const MAX_DEMO_SUBJECTS: usize = 100_000;

const SMOKER_PREVALENCE: f64 = 0.17;
const DIABETIC_PREVALENCE: f64 = 0.105;
const HYPERTENSIVE_PREVALENCE: f64 = 0.25;
const CARDIAC_PREVALENCE: f64 = 0.08;
const MAX_CONDITION_PROBABILITY: f64 = 0.7;
const ACTIVE_DEVICE_SHARE: f64 = 0.95;
const BINDING_LOOKBACK_DAYS: i64 = 730;
/// Members whose first watch was later replaced by a second one.
const REPLACED_DEVICE_SHARE: f64 = 0.05;

fn age_risk_factor(age: u32) -> f64 {
    match age {
        0..=29 => 0.3,
        30..=49 => 0.7,
        50..=64 => 1.2,
        _ => 1.8,
    }
}

/// Comorbidity flags for a synthetic subject: [smoker, diabetic, hypertensive, cardiac].
pub fn draw_conditions<R: Rng + ?Sized>(age: u32, sex: Sex, rng: &mut R) -> [bool; 4] {
    let male = sex == Sex::Male;
    let sex_factor = |male_factor: f64, female_factor: f64| if male { male_factor } else { female_factor };
    let age_factor = age_risk_factor(age);
    let mut draw = |base: f64, sex_adj: f64| {
        rng.gen_bool((base * age_factor * sex_adj).min(MAX_CONDITION_PROBABILITY))
    };

    let smoker = draw(SMOKER_PREVALENCE, sex_factor(1.2, 0.8));
    let diabetic = draw(DIABETIC_PREVALENCE, sex_factor(1.1, 0.9));
    let mut hypertensive = draw(HYPERTENSIVE_PREVALENCE, sex_factor(1.1, 0.9));
    let mut cardiac = draw(CARDIAC_PREVALENCE, sex_factor(1.3, 0.7));

    if diabetic && rng.gen_bool(0.4) {
        hypertensive = true;
    }
    if hypertensive && rng.gen_bool(0.3) {
        cardiac = true;
    }
    if smoker && rng.gen_bool(0.2) {
        cardiac = true;
    }

    [smoker, diabetic, hypertensive, cardiac]
}

/// One synthetic cohort member, born and bound relative to `now`.
pub fn draw_member<R: Rng + ?Sized>(now: NaiveDateTime, rng: &mut R) -> CohortMember {
    let age = rng.gen_range(DEMO_MIN_AGE..=DEMO_MAX_AGE);
    let sex = if rng.gen_bool(0.5) { Sex::Male } else { Sex::Female };
    let last_birthday = now.date() - Duration::days(rng.gen_range(0..365));
    let date_of_birth = birth_date(last_birthday, age);
    let [smoker, diabetic, hypertensive, cardiac_history] = draw_conditions(age, sex, rng);

    let bound_seconds = rng.gen_range(0..BINDING_LOOKBACK_DAYS * 86_400);
    let device_bound_at = now - Duration::seconds(bound_seconds);

    CohortMember {
        date_of_birth,
        sex: Some(sex),
        smoker: Some(smoker),
        diabetic: Some(diabetic),
        hypertensive: Some(hypertensive),
        cardiac_history: Some(cardiac_history),
        device_serial: device_serial(),
        device_bound_at,
        device_active: Some(rng.gen_bool(ACTIVE_DEVICE_SHARE)),
    }
}

fn device_serial() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("VS{}", raw[..12].to_uppercase())
}

/// Date `age` years before `last_birthday`; 29 February maps to the 28th.
fn birth_date(last_birthday: NaiveDate, age: u32) -> NaiveDate {
    let year = last_birthday.year() - age as i32;
    last_birthday
        .with_year(year)
        .or_else(|| (last_birthday - Duration::days(1)).with_year(year))
        .unwrap_or(last_birthday)
}

/// Insert `count` synthetic members. Each member is its own transaction.
/// A few members also get a replacement device bound after the first one.
pub fn seed_demo_cohort<R: Rng + ?Sized>(
    conn: &Connection,
    count: usize,
    now: NaiveDateTime,
    rng: &mut R,
) -> Result<Vec<MemberIds>, SimulationError> {
    if count == 0 || count > MAX_DEMO_SUBJECTS {
        return Err(SimulationError::Config(format!(
            "demo cohort size must be in 1..={MAX_DEMO_SUBJECTS}, got {count}"
        )));
    }

    let mut ids = Vec::with_capacity(count);
    let mut replaced = 0usize;
    for _ in 0..count {
        let member = draw_member(now, rng);
        let member_ids = insert_cohort_member(conn, &member)?;
        if rng.gen_bool(REPLACED_DEVICE_SHARE) {
            let since_first = (now - member.device_bound_at).num_seconds().max(1);
            let bound_at = now - Duration::seconds(rng.gen_range(0..since_first));
            insert_device(conn, member_ids.subject_id, &device_serial(), bound_at, Some(true))?;
            replaced += 1;
        }
        ids.push(member_ids);
    }
    tracing::info!(subjects = ids.len(), replaced_devices = replaced, "Demo cohort seeded");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{load_cohort, open_memory_database};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn seeded_members_load_with_valid_ages() {
        let conn = open_memory_database().unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let ids = seed_demo_cohort(&conn, 200, now(), &mut rng).unwrap();
        assert_eq!(ids.len(), 200);

        let cohort = load_cohort(&conn, None, now().date()).unwrap();
        assert_eq!(cohort.len(), 200);
        for s in &cohort {
            assert!((DEMO_MIN_AGE..=DEMO_MAX_AGE).contains(&s.age), "age {}", s.age);
            assert!(s.device_bound_at <= now());
        }
    }

    #[test]
    fn replacement_devices_do_not_duplicate_subjects() {
        let conn = open_memory_database().unwrap();
        let mut rng = StdRng::seed_from_u64(29);
        seed_demo_cohort(&conn, 400, now(), &mut rng).unwrap();

        let devices: i64 = conn
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))
            .unwrap();
        assert!(devices > 400, "expected some replacement devices, got {devices}");

        let cohort = load_cohort(&conn, None, now().date()).unwrap();
        assert_eq!(cohort.len(), 400);
        assert!(cohort.windows(2).all(|w| w[0].subject_id < w[1].subject_id));
    }

    #[test]
    fn older_subjects_carry_more_conditions() {
        let mut rng = StdRng::seed_from_u64(5);
        let burden = |age, rng: &mut StdRng| -> usize {
            (0..4000)
                .map(|_| draw_conditions(age, Sex::Male, rng).iter().filter(|&&c| c).count())
                .sum()
        };
        assert!(burden(25, &mut rng) < burden(75, &mut rng));
    }

    #[test]
    fn seeding_twice_does_not_collide() {
        let conn = open_memory_database().unwrap();
        seed_demo_cohort(&conn, 20, now(), &mut StdRng::seed_from_u64(1)).unwrap();
        seed_demo_cohort(&conn, 20, now(), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(load_cohort(&conn, None, now().date()).unwrap().len(), 40);
    }

    #[test]
    fn leap_day_birthday_falls_back() {
        let leap = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(birth_date(leap, 1), NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
        assert_eq!(birth_date(leap, 4), NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
    }

    #[test]
    fn zero_size_rejected() {
        let conn = open_memory_database().unwrap();
        let result = seed_demo_cohort(&conn, 0, now(), &mut StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(SimulationError::Config(_))));
    }
}
