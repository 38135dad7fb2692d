use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{ForecastError, ForecastResult};

/// Width of every feature vector.
pub const FEATURE_COUNT: usize = 8;

/// Canonical feature order. Persisted as the feature schema at training time.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "weekday",
    "month",
    "year",
    "holiday",
    "weekend",
    "day_of_year",
    "quarter",
    "week_of_year",
];

/// Years accepted by the calendar validation.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1970..=2100;

/// Raw calendar description of one service day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInput {
    /// ISO weekday, Monday = 1 .. Sunday = 7.
    pub weekday: u32,
    /// Day of month.
    pub day: u32,
    /// Month, 1..=12.
    pub month: u32,
    /// Calendar year.
    pub year: i32,
    /// Weekend flag as recorded by the restaurant.
    pub weekend: bool,
    /// Public holiday flag.
    pub holiday: bool,
}

impl CalendarInput {
    /// Builds an input from an actual date, keeping the recorded weekday and flags.
    #[must_use]
    pub fn from_date(weekday: u32, date: NaiveDate, weekend: bool, holiday: bool) -> Self {
        Self {
            weekday,
            day: date.day(),
            month: date.month(),
            year: date.year(),
            weekend,
            holiday,
        }
    }

    /// Checks ranges and returns the calendar date the input designates.
    pub fn date(&self) -> ForecastResult<NaiveDate> {
        if !(1..=7).contains(&self.weekday) {
            return Err(ForecastError::invalid(
                "weekday",
                format!("{} is outside 1..=7", self.weekday),
            ));
        }
        if !(1..=12).contains(&self.month) {
            return Err(ForecastError::invalid(
                "month",
                format!("{} is outside 1..=12", self.month),
            ));
        }
        if !(1..=31).contains(&self.day) {
            return Err(ForecastError::invalid(
                "day",
                format!("{} is outside 1..=31", self.day),
            ));
        }
        if !YEAR_RANGE.contains(&self.year) {
            return Err(ForecastError::invalid(
                "year",
                format!(
                    "{} is outside {}..={}",
                    self.year,
                    YEAR_RANGE.start(),
                    YEAR_RANGE.end()
                ),
            ));
        }
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(|| {
            ForecastError::invalid(
                "day",
                format!(
                    "{:04}-{:02}-{:02} is not a calendar date",
                    self.year, self.month, self.day
                ),
            )
        })
    }
}

/// Fixed-order feature vector consumed by every meal regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// ISO weekday, 1..=7.
    pub weekday: u32,
    /// Month, 1..=12.
    pub month: u32,
    /// Calendar year.
    pub year: i32,
    /// Holiday flag.
    pub holiday: bool,
    /// Weekend flag.
    pub weekend: bool,
    /// Ordinal day of the year, 1..=366.
    pub day_of_year: u32,
    /// Quarter, 1..=4.
    pub quarter: u32,
    /// ISO-8601 week number.
    pub week_of_year: u32,
}

impl FeatureVector {
    /// Looks a feature up by its schema name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "weekday" => f64::from(self.weekday),
            "month" => f64::from(self.month),
            "year" => f64::from(self.year),
            "holiday" => flag(self.holiday),
            "weekend" => flag(self.weekend),
            "day_of_year" => f64::from(self.day_of_year),
            "quarter" => f64::from(self.quarter),
            "week_of_year" => f64::from(self.week_of_year),
            _ => return None,
        };
        Some(value)
    }

    /// Values in [`FEATURE_NAMES`] order.
    #[must_use]
    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.weekday),
            f64::from(self.month),
            f64::from(self.year),
            flag(self.holiday),
            flag(self.weekend),
            f64::from(self.day_of_year),
            f64::from(self.quarter),
            f64::from(self.week_of_year),
        ]
    }
}

/// Derives the feature vector for a calendar input.
///
/// Training rows and prediction requests both go through this function, so
/// day-of-year and week-of-year always come from real calendar arithmetic.
pub fn derive(input: &CalendarInput) -> ForecastResult<FeatureVector> {
    let date = input.date()?;
    Ok(FeatureVector {
        weekday: input.weekday,
        month: input.month,
        year: input.year,
        holiday: input.holiday,
        weekend: input.weekend,
        day_of_year: date.ordinal(),
        quarter: (input.month - 1) / 3 + 1,
        week_of_year: date.iso_week().week(),
    })
}

const fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday_tenth_february() -> CalendarInput {
        CalendarInput {
            weekday: 1,
            day: 10,
            month: 2,
            year: 2025,
            weekend: false,
            holiday: false,
        }
    }

    #[test]
    fn derives_real_calendar_features() {
        let features = derive(&monday_tenth_february()).unwrap();
        assert_eq!(
            features.to_row(),
            [1.0, 2.0, 2025.0, 0.0, 0.0, 41.0, 1.0, 7.0]
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let input = CalendarInput {
            weekday: 6,
            day: 28,
            month: 12,
            year: 2024,
            weekend: true,
            holiday: true,
        };
        assert_eq!(derive(&input).unwrap(), derive(&input).unwrap());
    }

    #[test]
    fn leap_years_and_iso_weeks_follow_the_calendar() {
        let input = CalendarInput {
            weekday: 2,
            day: 31,
            month: 12,
            year: 2024,
            weekend: false,
            holiday: false,
        };
        let features = derive(&input).unwrap();
        assert_eq!(features.day_of_year, 366);
        assert_eq!(features.quarter, 4);
        // 2024-12-31 belongs to ISO week 1 of 2025
        assert_eq!(features.week_of_year, 1);
    }

    #[test]
    fn named_lookup_matches_canonical_order() {
        let features = derive(&monday_tenth_february()).unwrap();
        let row = features.to_row();
        for (idx, name) in FEATURE_NAMES.iter().enumerate() {
            assert_eq!(features.get(name), Some(row[idx]));
        }
        assert_eq!(features.get("temperature"), None);
    }

    #[test]
    fn rejects_out_of_domain_values() {
        let mut input = monday_tenth_february();
        input.day = 40;
        let err = derive(&input).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidInput { field: "day", .. }));

        let mut input = monday_tenth_february();
        input.day = 30;
        assert!(derive(&input).is_err());

        let mut input = monday_tenth_february();
        input.weekday = 0;
        assert!(matches!(
            derive(&input).unwrap_err(),
            ForecastError::InvalidInput {
                field: "weekday",
                ..
            }
        ));
    }
}
