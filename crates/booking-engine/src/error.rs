//! Error types for booking-engine operations.
//!
//! Only caller mistakes surface here. Policy refusals (out-of-window toggles,
//! guests touching blocked time, a guest trying to block) are not errors; see
//! [`crate::controller::Outcome`].

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The repeat rule cannot be expanded (zero interval, reversed window,
    /// unparseable rule text).
    #[error("Invalid repeat rule: {0}")]
    InvalidRule(String),

    /// An hour-only operation was called on a whole-date unit.
    #[error("Invalid granularity: {0} is a date unit, not an hour unit")]
    InvalidGranularity(String),

    /// Hour of day outside 0..=23.
    #[error("Invalid hour: {0} (expected 0..=23)")]
    InvalidHour(u8),

    /// Malformed compact hour list such as `"7-3"` or `"1,,x"`.
    #[error("Invalid hour range: {0}")]
    InvalidHourRange(String),

    /// A time unit string that is neither `YYYY-MM-DD` nor `YYYY-MM-DDTHH`.
    #[error("Invalid time unit: {0}")]
    InvalidUnit(String),

    /// A role, view or direction name that is not recognised.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The recurrence library rejected or failed to expand a rule.
    #[error("Expansion error: {0}")]
    Expansion(String),
}

pub type Result<T> = std::result::Result<T, BookingError>;
