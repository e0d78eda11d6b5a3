//! Run period resolution.
//!
//! A scheduler hands each invocation a logical execution date. The loader only
//! cares about the calendar month that date falls in, so everything downstream
//! is keyed by a [`RunPeriod`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use snafu::prelude::*;

use crate::error::{InvalidMonthSnafu, InvertedRangeSnafu, MalformedDateSnafu, PeriodError};

/// `YYYY-MM-DD` with exactly four year digits and two-digit month and day.
static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid regex"));

/// `YYYY-MM` with the same digit counts.
static YEAR_MONTH_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}$").expect("valid regex"));

/// The (year, month) key identifying one scheduled batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunPeriod {
    year: i32,
    month: u32,
}

impl RunPeriod {
    /// Create a period, rejecting months outside of 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        ensure!((1..=12).contains(&month), InvalidMonthSnafu { month });
        Ok(Self { year, month })
    }

    /// The period a calendar date falls in.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following calendar month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every period from `start` to `end`, both inclusive.
    pub fn months_between(
        start: RunPeriod,
        end: RunPeriod,
    ) -> Result<impl Iterator<Item = RunPeriod>, PeriodError> {
        ensure!(
            start <= end,
            InvertedRangeSnafu {
                start: start.to_string(),
                end: end.to_string(),
            }
        );
        Ok(std::iter::successors(Some(start), move |p| {
            let next = p.next();
            (next <= end).then_some(next)
        }))
    }
}

impl fmt::Display for RunPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Parses either `YYYY-MM` or anything [`resolve`] accepts.
impl FromStr for RunPeriod {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if YEAR_MONTH_SHAPE.is_match(trimmed) {
            return resolve(&format!("{trimmed}-01")).map_err(|_| {
                MalformedDateSnafu {
                    input: s.to_string(),
                }
                .build()
            });
        }
        resolve(trimmed)
    }
}

/// Resolve a scheduler execution date into its run period.
///
/// Accepts `YYYY-MM-DD` or a date-time whose date portion precedes a `T` (or a
/// space). The time and zone suffix is dropped without conversion, so
/// `2024-03-31T23:30:00-05:00` belongs to March.
pub fn resolve(execution_date: &str) -> Result<RunPeriod, PeriodError> {
    let trimmed = execution_date.trim();
    let date_part = match trimmed.find(['T', ' ']) {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };

    ensure!(
        DATE_SHAPE.is_match(date_part),
        MalformedDateSnafu {
            input: execution_date,
        }
    );

    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| {
        MalformedDateSnafu {
            input: execution_date,
        }
        .build()
    })?;

    Ok(RunPeriod::from_date(date))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bare_date() {
        let period = resolve("2024-03-01").unwrap();
        assert_eq!(period.year(), 2024);
        assert_eq!(period.month(), 3);
    }

    #[test]
    fn test_resolve_ignores_time_and_zone_suffix() {
        let expected = resolve("2024-03-15").unwrap();
        for input in [
            "2024-03-15T00:00:00",
            "2024-03-15T23:59:59+05:30",
            "2024-03-15T12:00:00-08:00",
            "2024-03-15T00:00:00.000000Z",
            "2024-03-15 00:00:00",
        ] {
            assert_eq!(resolve(input).unwrap(), expected, "input: {input}");
        }
    }

    #[test]
    fn test_resolve_takes_calendar_date_literally() {
        // No conversion to UTC: late evening west of Greenwich stays in March.
        let period = resolve("2024-03-31T23:30:00-05:00").unwrap();
        assert_eq!(period, RunPeriod::new(2024, 3).unwrap());
    }

    #[test]
    fn test_resolve_rejects_malformed_input() {
        for input in [
            "not-a-date",
            "",
            "2024-13-01",
            "2024/03/01",
            "2024-03-01x",
            "T2024",
            "24-03-01",
            "2024-3-1",
            "+2024-03-01",
            "02024-03-01",
            "２０２４-03-01",
        ] {
            let err = resolve(input).unwrap_err();
            assert!(
                matches!(err, PeriodError::MalformedDate { .. }),
                "input {input:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_malformed_error_names_input() {
        let err = resolve("not-a-date").unwrap_err();
        assert!(err.to_string().contains("not-a-date"));
    }

    #[test]
    fn test_new_rejects_invalid_month() {
        assert!(RunPeriod::new(2024, 0).is_err());
        assert!(RunPeriod::new(2024, 13).is_err());
        assert!(RunPeriod::new(2024, 12).is_ok());
    }

    #[test]
    fn test_next_rolls_over_year() {
        let dec = RunPeriod::new(2023, 12).unwrap();
        assert_eq!(dec.next(), RunPeriod::new(2024, 1).unwrap());
    }

    #[test]
    fn test_months_between_is_inclusive() {
        let start = RunPeriod::new(2023, 11).unwrap();
        let end = RunPeriod::new(2024, 2).unwrap();
        let periods: Vec<String> = RunPeriod::months_between(start, end)
            .unwrap()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(periods, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn test_months_between_single_period() {
        let p = RunPeriod::new(2018, 3).unwrap();
        assert_eq!(RunPeriod::months_between(p, p).unwrap().count(), 1);
    }

    #[test]
    fn test_months_between_rejects_inverted_range() {
        let start = RunPeriod::new(2024, 2).unwrap();
        let end = RunPeriod::new(2024, 1).unwrap();
        assert!(RunPeriod::months_between(start, end).is_err());
    }

    #[test]
    fn test_from_str_accepts_year_month_and_dates() {
        assert_eq!(
            "2018-03".parse::<RunPeriod>().unwrap(),
            RunPeriod::new(2018, 3).unwrap()
        );
        assert_eq!(
            "2018-03-01T00:00:00".parse::<RunPeriod>().unwrap(),
            RunPeriod::new(2018, 3).unwrap()
        );
        assert!("2018".parse::<RunPeriod>().is_err());
        assert!("18-03".parse::<RunPeriod>().is_err());
        assert!("2018-3".parse::<RunPeriod>().is_err());
        assert!("2018-13".parse::<RunPeriod>().is_err());
    }
}
