//! # booking-engine
//!
//! Availability and booking state for an interactive calendar.
//!
//! A host marks dates or single hours as blocked, directly or through a
//! bounded repeat rule; a guest reserves hours the host left open. The engine
//! owns those two sets and enforces that they never overlap, that nothing in
//! the past or beyond the focused month changes, and that applying a repeat
//! rule fully replaces whatever the previous rule produced.
//!
//! ## Modules
//!
//! - [`unit`]: date and hour units in local calendar fields
//! - [`interval`]: single-unit intervals and the exactly-once interval set
//! - [`recurrence`]: repeat rules, RRULE text and bounded expansion via `rrule`
//! - [`policy`]: pure availability decisions and role checks
//! - [`controller`]: the session state machine (navigate, toggle, repeat)
//! - [`error`]: error types
//!
//! ## Quick start
//!
//! ```rust
//! use booking_engine::{CalendarController, Role, TimeUnit};
//! use chrono::NaiveDate;
//!
//! let now = NaiveDate::from_ymd_opt(2024, 3, 1)
//!     .unwrap()
//!     .and_hms_opt(8, 0, 0)
//!     .unwrap();
//! let mut calendar = CalendarController::new(now);
//!
//! let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
//! assert!(calendar.toggle_unit(TimeUnit::date(date), Role::Host).is_applied());
//! assert!(calendar.policy().is_fully_blocked(date));
//! assert_eq!(calendar.blocked().count_for_date(date), 24);
//! ```

pub mod controller;
pub mod error;
pub mod interval;
pub mod policy;
pub mod recurrence;
pub mod unit;

pub use controller::{CalendarController, Cursor, Direction, Outcome, SessionSnapshot, ViewMode};
pub use error::BookingError;
pub use interval::{Interval, IntervalSet};
pub use policy::{AvailabilityState, DaySummary, Policy, PolicyViolation, Role};
pub use recurrence::{
    expand, format_hour_ranges, parse_hour_ranges, Frequency, RepeatChoice, RepeatPatch,
    RepeatRule, WeekdaySet, OCCURRENCE_CAP,
};
pub use unit::{Granularity, TimeUnit, HOURS_PER_DAY};
