//! Calendar periods used as aggregation keys.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Granularity of an aggregation. `Day` is primitive; the others are
/// derived by summing day rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

/// An inclusive range of civil dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting `end < start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidPeriod {
                value: format!("{start}..{end}"),
            });
        }
        Ok(Self { start, end })
    }

    /// A single day.
    #[must_use]
    pub const fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The full calendar month.
    pub fn month(year: i32, month: u32) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidPeriod {
            value: format!("{year:04}-{month:02}"),
        };
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(invalid)?;
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the range, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Returns `Some((year, month))` when the range is exactly one calendar month.
    #[must_use]
    pub fn as_month(&self) -> Option<(i32, u32)> {
        let month = Self::month(self.start.year(), self.start.month()).ok()?;
        (month == *self).then_some((self.start.year(), self.start.month()))
    }

    /// `YYYY-MM` for a calendar month, `YYYY-MM-DD` for one day, else `start..end`.
    #[must_use]
    pub fn label(&self) -> String {
        if let Some((year, month)) = self.as_month() {
            format!("{year:04}-{month:02}")
        } else if self.start == self.end {
            self.start.to_string()
        } else {
            format!("{}..{}", self.start, self.end)
        }
    }

    /// Number of days in the range.
    #[must_use]
    pub fn len_days(&self) -> u64 {
        self.end
            .signed_duration_since(self.start)
            .num_days()
            .unsigned_abs()
            + 1
    }

    /// The day after `end`, used to build half-open instant windows.
    #[must_use]
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX)
    }
}

/// Key identifying the period a usage row covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodKey {
    Day(NaiveDate),
    /// ISO week.
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    /// An arbitrary inclusive range.
    Range(DateRange),
}

impl PeriodKey {
    /// The period of the given granularity that contains `date`.
    #[must_use]
    pub fn containing(date: NaiveDate, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Day => Self::Day(date),
            Granularity::Week => {
                let iso = date.iso_week();
                Self::Week {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
            Granularity::Month => Self::Month {
                year: date.year(),
                month: date.month(),
            },
        }
    }

    /// First civil date covered by the period.
    #[must_use]
    pub fn start_date(&self) -> Option<NaiveDate> {
        match *self {
            Self::Day(date) => Some(date),
            Self::Week { year, week } => NaiveDate::from_isoywd_opt(year, week, Weekday::Mon),
            Self::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
            Self::Range(range) => Some(range.start),
        }
    }

    /// The covered dates as a range.
    #[must_use]
    pub fn date_range(&self) -> Option<DateRange> {
        match *self {
            Self::Day(date) => Some(DateRange::day(date)),
            Self::Week { .. } => {
                let start = self.start_date()?;
                Some(DateRange {
                    start,
                    end: start.checked_add_days(Days::new(6))?,
                })
            }
            Self::Month { year, month } => DateRange::month(year, month).ok(),
            Self::Range(range) => Some(range),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(date) => write!(f, "{date}"),
            Self::Week { year, week } => write!(f, "{year:04}-W{week:02}"),
            Self::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            Self::Range(range) => write!(f, "{}..{}", range.start, range.end),
        }
    }
}

impl FromStr for PeriodKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidPeriod {
            value: s.to_string(),
        };
        let s = s.trim();

        if let Some((start, end)) = s.split_once("..") {
            let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").map_err(|_| invalid())?;
            let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").map_err(|_| invalid())?;
            return DateRange::new(start, end).map(Self::Range);
        }
        if let Some((year, week)) = s.split_once("-W") {
            let year: i32 = year.parse().map_err(|_| invalid())?;
            let week: u32 = week.parse().map_err(|_| invalid())?;
            NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?;
            return Ok(Self::Week { year, week });
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Self::Day(date));
        }
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        DateRange::month(year, month).map_err(|_| invalid())?;
        Ok(Self::Month { year, month })
    }
}

impl Serialize for PeriodKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PeriodKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
