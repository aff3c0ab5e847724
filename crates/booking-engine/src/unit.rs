//! Addressable units of calendar time: a whole date or one hour within a date.
//!
//! Units are modelled directly in local calendar fields (date + hour of day).
//! There is no instant and no UTC offset anywhere in this crate, so hour and
//! day boundaries are exactly what the calendar shows.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};

/// Number of one-hour slots in a calendar date.
pub const HOURS_PER_DAY: u8 = 24;

/// Whether a unit denotes a whole date or a single hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Date,
    Hour,
}

/// A single addressable unit of calendar time.
///
/// Ordering is chronological; a date unit sorts immediately before the hour
/// units of the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "UnitRepr", into = "UnitRepr")]
pub struct TimeUnit {
    date: NaiveDate,
    hour: Option<u8>,
}

#[derive(Serialize, Deserialize)]
struct UnitRepr {
    date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hour: Option<u8>,
}

impl TryFrom<UnitRepr> for TimeUnit {
    type Error = BookingError;

    fn try_from(repr: UnitRepr) -> Result<Self> {
        match repr.hour {
            Some(h) => TimeUnit::hour(repr.date, h),
            None => Ok(TimeUnit::date(repr.date)),
        }
    }
}

impl From<TimeUnit> for UnitRepr {
    fn from(unit: TimeUnit) -> Self {
        UnitRepr {
            date: unit.date,
            hour: unit.hour,
        }
    }
}

impl TimeUnit {
    /// Whole-date unit.
    pub fn date(date: NaiveDate) -> Self {
        TimeUnit { date, hour: None }
    }

    /// One-hour unit. Fails with [`BookingError::InvalidHour`] for `hour > 23`.
    pub fn hour(date: NaiveDate, hour: u8) -> Result<Self> {
        if hour >= HOURS_PER_DAY {
            return Err(BookingError::InvalidHour(hour));
        }
        Ok(TimeUnit {
            date,
            hour: Some(hour),
        })
    }

    /// The hour unit that `dt` falls in.
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        TimeUnit {
            date: dt.date(),
            hour: Some(dt.hour() as u8),
        }
    }

    /// All 24 hour units of `date`, in order.
    pub fn hours_of(date: NaiveDate) -> impl Iterator<Item = TimeUnit> {
        (0..HOURS_PER_DAY).map(move |h| TimeUnit {
            date,
            hour: Some(h),
        })
    }

    pub fn granularity(&self) -> Granularity {
        match self.hour {
            Some(_) => Granularity::Hour,
            None => Granularity::Date,
        }
    }

    /// The calendar date this unit belongs to.
    pub fn date_of(&self) -> NaiveDate {
        self.date
    }

    /// Hour of day for an hour unit.
    ///
    /// # Errors
    /// Returns [`BookingError::InvalidGranularity`] for a date unit.
    pub fn hour_of(&self) -> Result<u8> {
        self.hour
            .ok_or_else(|| BookingError::InvalidGranularity(self.to_string()))
    }

    /// Same granularity and same position. A date unit is never the same unit
    /// as one of its hours.
    pub fn same_unit(&self, other: &TimeUnit) -> bool {
        self == other
    }

    /// True if `other` lies within this unit: a date unit contains itself and
    /// every hour of its date, an hour unit contains only itself.
    pub fn contains(&self, other: &TimeUnit) -> bool {
        match self.hour {
            None => self.date == other.date,
            Some(_) => self == other,
        }
    }

    /// Local start of the unit.
    pub fn start(&self) -> NaiveDateTime {
        let hour = u32::from(self.hour.unwrap_or(0));
        self.date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour))
    }

    /// Exclusive end of the occupied span: the next hour, or the next midnight.
    /// Saturates at [`NaiveDateTime::MAX`] on the last representable date.
    pub fn end_of_unit(&self) -> NaiveDateTime {
        let span = match self.hour {
            Some(_) => Duration::hours(1),
            None => Duration::days(1),
        };
        self.start()
            .checked_add_signed(span)
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Compare against `reference` at this unit's own granularity: a date unit
    /// is before `reference` only if its whole date precedes the reference
    /// date; an hour unit compares against the reference's hour.
    pub fn is_before(&self, reference: NaiveDateTime) -> bool {
        match self.hour {
            None => self.date < reference.date(),
            Some(h) => (self.date, u32::from(h)) < (reference.date(), reference.hour()),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hour {
            Some(h) => write!(f, "{}T{:02}", self.date.format("%Y-%m-%d"), h),
            None => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = BookingError;

    /// Parses `2024-03-15` (date unit) or `2024-03-15T14` (hour unit).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || BookingError::InvalidUnit(s.to_string());
        let (date_part, hour_part) = match s.split_once('T') {
            Some((d, h)) => (d, Some(h)),
            None => (s, None),
        };
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| invalid())?;
        match hour_part {
            None => Ok(TimeUnit::date(date)),
            Some(h) => {
                let hour: u8 = h.parse().map_err(|_| invalid())?;
                TimeUnit::hour(date, hour)
            }
        }
    }
}

/// First date of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// Last date of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// True if both dates fall in the same calendar month.
pub fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}
