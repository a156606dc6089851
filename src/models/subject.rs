use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::enums::Sex;

/// A monitored subject, as read from the cohort tables.
///
/// Never mutated by the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: i64,
    pub age: u32,
    pub sex: Sex,
    pub smoker: bool,
    pub diabetic: bool,
    pub hypertensive: bool,
    pub cardiac_history: bool,
    pub device_id: i64,
    pub device_bound_at: NaiveDateTime,
    pub device_active: bool,
}

impl Subject {
    /// Number of comorbidity flags set.
    pub fn comorbidity_count(&self) -> usize {
        [self.smoker, self.diabetic, self.hypertensive, self.cardiac_history]
            .iter()
            .filter(|&&flag| flag)
            .count()
    }
}

/// Whole years between `date_of_birth` and `as_of`, 0 for future dates.
pub fn age_on(date_of_birth: NaiveDate, as_of: NaiveDate) -> u32 {
    let mut years = as_of.year() - date_of_birth.year();
    if (as_of.month(), as_of.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}
