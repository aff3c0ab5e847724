//! Availability decisions over a cursor and the blocked/booked sets.
//!
//! [`Policy`] is a read-only view. The rendering layer queries it once per
//! visible cell; the controller consults it before every mutation.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::Cursor;
use crate::error::BookingError;
use crate::interval::IntervalSet;
use crate::unit::{month_end, month_start, Granularity, TimeUnit, HOURS_PER_DAY};

/// Who is acting on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Owns the calendar and decides which time is blocked.
    Host,
    /// Reserves time the host left available.
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

impl FromStr for Role {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Role::Host),
            "guest" => Ok(Role::Guest),
            other => Err(BookingError::Parse(format!("unknown role '{}'", other))),
        }
    }
}

/// Visual state of one calendar cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityState {
    Available,
    PartialBlock,
    FullBlock,
    PartialBooked,
    Booked,
    OutOfWindow,
}

/// Why a command was refused. Refusals are expected and leave state as is.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyViolation {
    #[error("unit is in the past or beyond the focused month")]
    OutOfWindow,
    #[error("{role} may not perform this action")]
    NotPermitted { role: Role },
    #[error("unit is blocked by the host")]
    Blocked,
    #[error("unit is booked by a guest")]
    Booked,
    #[error("the agenda view is read-only")]
    ReadOnlyView,
    #[error("date is fully blocked")]
    DateFullyBlocked,
}

/// Blocked and booked hour counts for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub blocked_hours: u8,
    pub booked_hours: u8,
    pub state: AvailabilityState,
}

/// Borrowed view of a calendar session used for every availability decision.
#[derive(Debug, Clone, Copy)]
pub struct Policy<'a> {
    cursor: &'a Cursor,
    blocked: &'a IntervalSet,
    booked: &'a IntervalSet,
    now: NaiveDateTime,
}

impl<'a> Policy<'a> {
    pub fn new(
        cursor: &'a Cursor,
        blocked: &'a IntervalSet,
        booked: &'a IntervalSet,
        now: NaiveDateTime,
    ) -> Self {
        Policy {
            cursor,
            blocked,
            booked,
            now,
        }
    }

    /// Last date that may be selected: the end of the focused month.
    pub fn window_end(&self) -> NaiveDate {
        month_end(self.cursor.focused_date)
    }

    /// True if `unit` is in the past (at its own granularity) or after the end
    /// of the focused month. Holds for every role.
    pub fn is_out_of_window(&self, unit: &TimeUnit) -> bool {
        unit.is_before(self.now) || unit.date_of() > self.window_end()
    }

    /// A date unit is blocked when its date is fully blocked; an hour unit
    /// when the hour, or its whole date, is blocked.
    pub fn is_blocked(&self, unit: &TimeUnit) -> bool {
        is_marked(self.blocked, unit)
    }

    pub fn is_partially_blocked(&self, date: NaiveDate) -> bool {
        is_partial(self.blocked, date)
    }

    pub fn is_fully_blocked(&self, date: NaiveDate) -> bool {
        is_full(self.blocked, date)
    }

    pub fn is_booked(&self, unit: &TimeUnit) -> bool {
        is_marked(self.booked, unit)
    }

    pub fn is_partially_booked(&self, date: NaiveDate) -> bool {
        is_partial(self.booked, date)
    }

    pub fn is_fully_booked(&self, date: NaiveDate) -> bool {
        is_full(self.booked, date)
    }

    /// Whether `role` may change the blocked state of `unit`.
    pub fn check_block(&self, unit: &TimeUnit, role: Role) -> Result<(), PolicyViolation> {
        if role != Role::Host {
            return Err(PolicyViolation::NotPermitted { role });
        }
        if self.is_out_of_window(unit) {
            return Err(PolicyViolation::OutOfWindow);
        }
        Ok(())
    }

    /// Whether `role` may book `unit`. Blocked time is checked at the unit's
    /// own granularity and at its containing date.
    pub fn check_book(&self, unit: &TimeUnit, role: Role) -> Result<(), PolicyViolation> {
        if role != Role::Guest {
            return Err(PolicyViolation::NotPermitted { role });
        }
        if self.is_out_of_window(unit) {
            return Err(PolicyViolation::OutOfWindow);
        }
        if self.is_blocked(unit) || self.is_fully_blocked(unit.date_of()) {
            return Err(PolicyViolation::Blocked);
        }
        Ok(())
    }

    pub fn can_toggle_block(&self, unit: &TimeUnit, role: Role) -> bool {
        self.check_block(unit, role).is_ok()
    }

    pub fn can_toggle_book(&self, unit: &TimeUnit, role: Role) -> bool {
        self.check_book(unit, role).is_ok()
    }

    /// State used to paint one cell.
    ///
    /// For a date that is both partially blocked and partially booked, each
    /// role sees its own marks first: the host gets `PartialBlock`, the guest
    /// `PartialBooked`.
    pub fn availability_state(&self, unit: &TimeUnit, role: Role) -> AvailabilityState {
        if self.is_out_of_window(unit) {
            return AvailabilityState::OutOfWindow;
        }
        let date = unit.date_of();
        if unit.granularity() == Granularity::Hour {
            return if self.is_blocked(unit) {
                AvailabilityState::FullBlock
            } else if self.is_booked(unit) {
                AvailabilityState::Booked
            } else {
                AvailabilityState::Available
            };
        }
        if self.is_fully_blocked(date) {
            return AvailabilityState::FullBlock;
        }
        if self.is_fully_booked(date) {
            return AvailabilityState::Booked;
        }
        let partial_block = self.is_partially_blocked(date);
        let partial_book = self.is_partially_booked(date);
        match (role, partial_block, partial_book) {
            (Role::Guest, _, true) | (Role::Host, false, true) => AvailabilityState::PartialBooked,
            (_, true, _) => AvailabilityState::PartialBlock,
            _ => AvailabilityState::Available,
        }
    }

    pub fn day_summary(&self, date: NaiveDate, role: Role) -> DaySummary {
        DaySummary {
            date,
            blocked_hours: hour_count(self.blocked, date),
            booked_hours: hour_count(self.booked, date),
            state: self.availability_state(&TimeUnit::date(date), role),
        }
    }

    /// One summary per date of the focused month.
    pub fn month_grid(&self, role: Role) -> Vec<DaySummary> {
        month_start(self.cursor.focused_date)
            .iter_days()
            .take_while(|d| *d <= self.window_end())
            .map(|d| self.day_summary(d, role))
            .collect()
    }

    /// State of every hour of the focused date.
    pub fn day_grid(&self, role: Role) -> Vec<(TimeUnit, AvailabilityState)> {
        TimeUnit::hours_of(self.cursor.focused_date)
            .map(|unit| (unit, self.availability_state(&unit, role)))
            .collect()
    }
}

fn hour_count(set: &IntervalSet, date: NaiveDate) -> u8 {
    if set.contains(&TimeUnit::date(date)) {
        HOURS_PER_DAY
    } else {
        set.count_for_date(date)
    }
}

fn is_full(set: &IntervalSet, date: NaiveDate) -> bool {
    hour_count(set, date) == HOURS_PER_DAY
}

fn is_partial(set: &IntervalSet, date: NaiveDate) -> bool {
    let count = hour_count(set, date);
    count > 0 && count < HOURS_PER_DAY
}

fn is_marked(set: &IntervalSet, unit: &TimeUnit) -> bool {
    match unit.granularity() {
        Granularity::Date => is_full(set, unit.date_of()),
        Granularity::Hour => set.contains(unit) || set.contains(&TimeUnit::date(unit.date_of())),
    }
}
