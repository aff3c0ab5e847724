//! The calendar session: cursor, blocked/booked sets and the repeat rule.
//!
//! [`CalendarController`] is the only owner of session state. Every command
//! runs its policy and validation checks first and mutates afterwards, so a
//! refused or rejected command leaves the session exactly as it was.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{BookingError, Result};
use crate::interval::IntervalSet;
use crate::policy::{AvailabilityState, Policy, PolicyViolation, Role};
use crate::recurrence::{self, RepeatPatch, RepeatRule};
use crate::unit::{month_end, month_start, Granularity, TimeUnit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Month,
    Day,
    Agenda,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Month => write!(f, "month"),
            ViewMode::Day => write!(f, "day"),
            ViewMode::Agenda => write!(f, "agenda"),
        }
    }
}

impl FromStr for ViewMode {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "month" => Ok(ViewMode::Month),
            "day" => Ok(ViewMode::Day),
            "agenda" => Ok(ViewMode::Agenda),
            other => Err(BookingError::Parse(format!("unknown view '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Prev,
    Next,
}

impl FromStr for Direction {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prev" | "back" => Ok(Direction::Prev),
            "next" => Ok(Direction::Next),
            other => Err(BookingError::Parse(format!("unknown direction '{}'", other))),
        }
    }
}

/// Focused date and view mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub focused_date: NaiveDate,
    pub view_mode: ViewMode,
}

impl Cursor {
    /// The visible period: the focused month in month view, the focused date
    /// otherwise.
    pub fn period(&self) -> (NaiveDate, NaiveDate) {
        match self.view_mode {
            ViewMode::Month => (
                month_start(self.focused_date),
                month_end(self.focused_date),
            ),
            ViewMode::Day | ViewMode::Agenda => (self.focused_date, self.focused_date),
        }
    }
}

/// Result of a command that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// The command took effect.
    Applied,
    /// Policy refused the command; nothing changed.
    Refused(PolicyViolation),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// Serialisable copy of a session's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub now: NaiveDateTime,
    pub cursor: Cursor,
    pub repeat: RepeatRule,
    pub blocked: IntervalSet,
    pub booked: IntervalSet,
}

/// One calendar session.
#[derive(Debug, Clone)]
pub struct CalendarController {
    now: NaiveDateTime,
    cursor: Cursor,
    blocked: IntervalSet,
    booked: IntervalSet,
    repeat: RepeatRule,
}

macro_rules! refuse_unless {
    ($check:expr) => {
        if let Err(violation) = $check {
            tracing::debug!(%violation, "command refused");
            return Outcome::Refused(violation);
        }
    };
}

/// A date unit as its 24 hours; an hour unit as itself.
fn as_hours(unit: TimeUnit) -> Vec<TimeUnit> {
    match unit.granularity() {
        Granularity::Date => TimeUnit::hours_of(unit.date_of()).collect(),
        Granularity::Hour => vec![unit],
    }
}

fn refused(violation: PolicyViolation) -> Outcome {
    tracing::debug!(%violation, "command refused");
    Outcome::Refused(violation)
}

impl CalendarController {
    /// Fresh session focused on today's date in month view, with empty sets
    /// and a "no repeat" rule scoped to the current month.
    pub fn new(now: NaiveDateTime) -> Self {
        let cursor = Cursor {
            focused_date: now.date(),
            view_mode: ViewMode::Month,
        };
        let (start, end) = cursor.period();
        CalendarController {
            now,
            cursor,
            blocked: IntervalSet::new(),
            booked: IntervalSet::new(),
            repeat: RepeatRule::no_repeat(start, end),
        }
    }

    /// Fresh session preloaded with previously persisted host blocks.
    pub fn with_blocked(now: NaiveDateTime, blocked: impl IntoIterator<Item = TimeUnit>) -> Self {
        let mut controller = CalendarController::new(now);
        controller.load_blocked(blocked);
        controller
    }

    /// Add persisted host blocks. Whole-date units are stored as their 24
    /// hours, so a loaded date counts as fully blocked. Hours a guest has
    /// already booked are skipped.
    pub fn load_blocked(&mut self, blocked: impl IntoIterator<Item = TimeUnit>) {
        let policy = self.policy();
        let mut skipped = 0usize;
        let hours: Vec<TimeUnit> = blocked
            .into_iter()
            .flat_map(as_hours)
            .filter(|hour| {
                let booked = policy.is_booked(hour);
                skipped += usize::from(booked);
                !booked
            })
            .collect();
        self.blocked.extend(hours);
        tracing::debug!(
            blocked = self.blocked.len(),
            skipped,
            "initial blocked set loaded"
        );
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// Move the session's notion of "now" (the lower edge of the window).
    pub fn set_now(&mut self, now: NaiveDateTime) {
        self.now = now;
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn view_mode(&self) -> ViewMode {
        self.cursor.view_mode
    }

    pub fn focused_date(&self) -> NaiveDate {
        self.cursor.focused_date
    }

    pub fn blocked(&self) -> &IntervalSet {
        &self.blocked
    }

    pub fn booked(&self) -> &IntervalSet {
        &self.booked
    }

    pub fn repeat_rule(&self) -> &RepeatRule {
        &self.repeat
    }

    /// Read-only view for availability queries.
    pub fn policy(&self) -> Policy<'_> {
        Policy::new(&self.cursor, &self.blocked, &self.booked, self.now)
    }

    pub fn availability_state(&self, unit: &TimeUnit, role: Role) -> AvailabilityState {
        self.policy().availability_state(unit, role)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            now: self.now,
            cursor: self.cursor,
            repeat: self.repeat.clone(),
            blocked: self.blocked.clone(),
            booked: self.booked.clone(),
        }
    }

    /// Rebuild a session from a snapshot taken with [`Self::snapshot`].
    ///
    /// Whole-date intervals are stored as their hours. A booked hour that is
    /// also blocked is dropped from the booked set.
    pub fn restore(snapshot: SessionSnapshot) -> Self {
        let blocked: IntervalSet = snapshot.blocked.units().flat_map(as_hours).collect();
        let mut dropped = 0usize;
        let booked: IntervalSet = snapshot
            .booked
            .units()
            .flat_map(as_hours)
            .filter(|hour| {
                let overlaps = blocked.contains(hour);
                dropped += usize::from(overlaps);
                !overlaps
            })
            .collect();
        if dropped > 0 {
            tracing::warn!(dropped, "snapshot booked hours overlap blocked time");
        }
        CalendarController {
            now: snapshot.now,
            cursor: snapshot.cursor,
            blocked,
            booked,
            repeat: snapshot.repeat,
        }
    }

    // ── Navigation ──────────────────────────────────────────────────────────

    /// Move one month (month view) or one day (day and agenda view). The
    /// repeat window follows the new period; the sets are untouched.
    pub fn navigate(&mut self, direction: Direction) -> Outcome {
        let current = self.cursor.focused_date;
        let target = match (self.cursor.view_mode, direction) {
            (ViewMode::Month, Direction::Prev) => {
                month_start(current).checked_sub_months(Months::new(1))
            }
            (ViewMode::Month, Direction::Next) => {
                month_start(current).checked_add_months(Months::new(1))
            }
            (_, Direction::Prev) => current.checked_sub_signed(Duration::days(1)),
            (_, Direction::Next) => current.checked_add_signed(Duration::days(1)),
        };
        self.go_to(target.unwrap_or(current));
        Outcome::Applied
    }

    /// Focus an arbitrary date, keeping the view mode.
    pub fn go_to(&mut self, date: NaiveDate) {
        self.cursor.focused_date = date;
        let (start, end) = self.cursor.period();
        self.repeat.window_start = start;
        self.repeat.window_end = end;
        tracing::trace!(focused = %date, view = %self.cursor.view_mode, "cursor moved");
    }

    /// Switch view mode. The repeat rule goes back to "no repeat" over the new
    /// view's period.
    pub fn change_view(&mut self, mode: ViewMode) -> Outcome {
        self.cursor.view_mode = mode;
        let (start, end) = self.cursor.period();
        self.repeat = RepeatRule::no_repeat(start, end);
        tracing::trace!(view = %mode, "view changed");
        Outcome::Applied
    }

    /// Open the day view for `date` (drill-down from a month cell).
    pub fn drill_down(&mut self, date: NaiveDate) -> Outcome {
        self.change_view(ViewMode::Day);
        self.go_to(date);
        Outcome::Applied
    }

    // ── Direct toggles ──────────────────────────────────────────────────────

    /// Toggle a unit for `role`.
    ///
    /// In month view every unit acts on its whole date. In day view a date
    /// unit acts on the whole date and an hour unit on that hour. The agenda
    /// view does not accept toggles.
    pub fn toggle_unit(&mut self, unit: TimeUnit, role: Role) -> Outcome {
        match (self.cursor.view_mode, unit.granularity()) {
            (ViewMode::Agenda, _) => refused(PolicyViolation::ReadOnlyView),
            (ViewMode::Month, _) | (ViewMode::Day, Granularity::Date) => {
                self.toggle_date(unit.date_of(), role)
            }
            (ViewMode::Day, Granularity::Hour) => self.toggle_hour(unit, role),
        }
    }

    fn toggle_date(&mut self, date: NaiveDate, role: Role) -> Outcome {
        let unit = TimeUnit::date(date);
        match role {
            Role::Host => {
                let policy = self.policy();
                refuse_unless!(policy.check_block(&unit, role));
                // Past hours are never cleared.
                let live: Vec<TimeUnit> = self
                    .blocked
                    .units_between(date..=date)
                    .filter(|hour| !policy.is_out_of_window(hour))
                    .collect();
                if !live.is_empty() {
                    for hour in &live {
                        self.blocked.remove(hour);
                    }
                    tracing::trace!(%date, removed = live.len(), "date unblocked");
                } else {
                    // Booked and already-past hours are left alone.
                    let free: Vec<TimeUnit> = TimeUnit::hours_of(date)
                        .filter(|hour| !policy.is_out_of_window(hour) && !policy.is_booked(hour))
                        .collect();
                    let added = free.len();
                    self.blocked.extend(free);
                    tracing::trace!(%date, added, "date blocked");
                }
                Outcome::Applied
            }
            Role::Guest => {
                let policy = self.policy();
                if policy.is_out_of_window(&unit) {
                    return refused(PolicyViolation::OutOfWindow);
                }
                let live: Vec<TimeUnit> = self
                    .booked
                    .units_between(date..=date)
                    .filter(|hour| !policy.is_out_of_window(hour))
                    .collect();
                if !live.is_empty() {
                    for hour in &live {
                        self.booked.remove(hour);
                    }
                    tracing::trace!(%date, removed = live.len(), "date unbooked");
                    return Outcome::Applied;
                }
                if policy.is_fully_blocked(date) {
                    return refused(PolicyViolation::Blocked);
                }
                // Blocked and already-past hours are skipped, not refused.
                let open: Vec<TimeUnit> = TimeUnit::hours_of(date)
                    .filter(|hour| policy.check_book(hour, role).is_ok())
                    .collect();
                let added = open.len();
                self.booked.extend(open);
                tracing::trace!(%date, added, "date booked");
                Outcome::Applied
            }
        }
    }

    fn toggle_hour(&mut self, unit: TimeUnit, role: Role) -> Outcome {
        let policy = self.policy();
        match role {
            Role::Host => {
                refuse_unless!(policy.check_block(&unit, role));
                if self.blocked.contains(&unit) {
                    self.blocked.remove(&unit);
                } else if policy.is_booked(&unit) {
                    return refused(PolicyViolation::Booked);
                } else {
                    self.blocked.insert_unit(unit);
                }
            }
            Role::Guest => {
                if policy.is_out_of_window(&unit) {
                    return refused(PolicyViolation::OutOfWindow);
                }
                if self.booked.contains(&unit) {
                    self.booked.remove(&unit);
                } else {
                    refuse_unless!(policy.check_book(&unit, role));
                    self.booked.insert_unit(unit);
                }
            }
        }
        tracing::trace!(%unit, %role, "hour toggled");
        Outcome::Applied
    }

    // ── Repeat rules ────────────────────────────────────────────────────────

    /// Update repeat-rule fields. When the resulting rule has a frequency it
    /// is applied straight away; otherwise the fields are only stored.
    ///
    /// # Errors
    /// Returns [`BookingError::InvalidRule`] if the patched rule is invalid;
    /// the session is left unchanged.
    pub fn set_repeat_rule(&mut self, patch: &RepeatPatch, role: Role) -> Result<Outcome> {
        if role != Role::Host {
            return Ok(refused(PolicyViolation::NotPermitted { role }));
        }
        let rule = self.repeat.patched(patch);
        rule.validate()?;
        if rule.is_repeating() {
            return self.apply_repeat_rule(rule, role);
        }
        self.repeat = rule;
        Ok(Outcome::Applied)
    }

    /// Set the repeat window explicitly (the range picker).
    pub fn set_repeat_window(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
        role: Role,
    ) -> Result<Outcome> {
        let patch = RepeatPatch {
            window_start: Some(start),
            window_end: Some(end),
            ..RepeatPatch::default()
        };
        self.set_repeat_rule(&patch, role)
    }

    /// Replace the host's blocks inside the rule's window with the rule's
    /// occurrences. Re-applying with different parameters never leaves units
    /// from the previous rule behind.
    ///
    /// Past units and units the guest has booked are neither cleared nor
    /// blocked. In day view a date that is already entirely blocked keeps its
    /// blocks.
    ///
    /// # Errors
    /// Returns [`BookingError::InvalidRule`] or [`BookingError::Expansion`]
    /// before any mutation if the rule does not validate or cannot be
    /// expanded.
    pub fn apply_repeat_rule(&mut self, rule: RepeatRule, role: Role) -> Result<Outcome> {
        if role != Role::Host {
            return Ok(refused(PolicyViolation::NotPermitted { role }));
        }
        let view = self.cursor.view_mode;
        if view == ViewMode::Agenda {
            return Ok(refused(PolicyViolation::ReadOnlyView));
        }
        rule.validate()?;

        let policy = self.policy();
        let repeating = rule.is_repeating();
        let day_view = view == ViewMode::Day;
        if repeating && day_view {
            let focused = self.cursor.focused_date;
            if focused < self.now.date() {
                return Ok(refused(PolicyViolation::OutOfWindow));
            }
            if policy.is_fully_blocked(focused) {
                return Ok(refused(PolicyViolation::DateFullyBlocked));
            }
        }

        let keep_date = |date: NaiveDate| repeating && day_view && policy.is_fully_blocked(date);
        let occurrences: Vec<TimeUnit> =
            recurrence::expand(&rule, view, |unit| !keep_date(unit.date_of()))?.collect();
        // Whole-date occurrences are stored as their hours.
        let additions: Vec<TimeUnit> = occurrences
            .iter()
            .copied()
            .flat_map(as_hours)
            .filter(|hour| !policy.is_out_of_window(hour) && !policy.is_booked(hour))
            .collect();
        let stale: Vec<TimeUnit> = self
            .blocked
            .units_between(rule.window_start..=rule.window_end)
            .filter(|unit| !policy.is_out_of_window(unit) && !keep_date(unit.date_of()))
            .collect();

        // Everything below is infallible.
        for unit in &stale {
            self.blocked.remove(unit);
        }
        let blocked_hours = additions.len();
        self.blocked.extend(additions);
        tracing::debug!(
            view = %view,
            cleared = stale.len(),
            occurrences = occurrences.len(),
            blocked_hours,
            window_start = %rule.window_start,
            window_end = %rule.window_end,
            "repeat rule applied"
        );
        self.repeat = rule;
        Ok(Outcome::Applied)
    }

    /// Clear the host's blocks in the current repeat window and return the
    /// rule to "no repeat". Same as applying a rule with no occurrences.
    ///
    /// # Errors
    /// Returns [`BookingError::InvalidRule`] if the stored window is reversed.
    pub fn reset_repeat(&mut self, role: Role) -> Result<Outcome> {
        let rule = RepeatRule::no_repeat(self.repeat.window_start, self.repeat.window_end);
        self.apply_repeat_rule(rule, role)
    }
}
