//! Repeat rules and their expansion into concrete time units.
//!
//! A [`RepeatRule`] is rendered to RFC 5545 text and expanded by the `rrule`
//! crate. Calendar fields are written with a `Z` suffix purely as a neutral
//! carrier: the local date and hour go in, the same date and hour come out,
//! and no offset arithmetic happens on the way.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Utc, Weekday};
use rrule::RRuleSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::controller::ViewMode;
use crate::error::{BookingError, Result};
use crate::unit::{TimeUnit, HOURS_PER_DAY};

/// Upper bound on raw occurrences produced by one expansion. Reaching it
/// just stops expansion.
pub const OCCURRENCE_CAP: u16 = 10_000;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
}

impl Frequency {
    fn as_ical(self) -> &'static str {
        match self {
            Frequency::Yearly => "YEARLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Daily => "DAILY",
            Frequency::Hourly => "HOURLY",
        }
    }

    /// The weekday filter only narrows monthly, weekly and daily rules.
    fn accepts_weekday_filter(self) -> bool {
        matches!(
            self,
            Frequency::Monthly | Frequency::Weekly | Frequency::Daily
        )
    }
}

impl FromStr for Frequency {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yearly" => Ok(Frequency::Yearly),
            "monthly" => Ok(Frequency::Monthly),
            "weekly" => Ok(Frequency::Weekly),
            "daily" => Ok(Frequency::Daily),
            "hourly" => Ok(Frequency::Hourly),
            other => Err(BookingError::InvalidRule(format!(
                "unknown frequency '{}'",
                other
            ))),
        }
    }
}

/// A frequency selection including "no repeat", as picked from the repeat
/// controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatChoice {
    No,
    Yearly,
    Monthly,
    Weekly,
    Daily,
    Hourly,
}

impl RepeatChoice {
    pub fn frequency(self) -> Option<Frequency> {
        match self {
            RepeatChoice::No => None,
            RepeatChoice::Yearly => Some(Frequency::Yearly),
            RepeatChoice::Monthly => Some(Frequency::Monthly),
            RepeatChoice::Weekly => Some(Frequency::Weekly),
            RepeatChoice::Daily => Some(Frequency::Daily),
            RepeatChoice::Hourly => Some(Frequency::Hourly),
        }
    }
}

impl From<Option<Frequency>> for RepeatChoice {
    fn from(frequency: Option<Frequency>) -> Self {
        match frequency {
            None => RepeatChoice::No,
            Some(Frequency::Yearly) => RepeatChoice::Yearly,
            Some(Frequency::Monthly) => RepeatChoice::Monthly,
            Some(Frequency::Weekly) => RepeatChoice::Weekly,
            Some(Frequency::Daily) => RepeatChoice::Daily,
            Some(Frequency::Hourly) => RepeatChoice::Hourly,
        }
    }
}

impl FromStr for RepeatChoice {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no" | "none" => Ok(RepeatChoice::No),
            other => other.parse::<Frequency>().map(|f| Some(f).into()),
        }
    }
}

/// A set of weekdays, iterated Monday first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn new() -> Self {
        Self::default()
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    pub fn insert(&mut self, day: Weekday) -> bool {
        let fresh = !self.contains(day);
        self.0 |= Self::bit(day);
        fresh
    }

    pub fn remove(&mut self, day: Weekday) -> bool {
        let present = self.contains(day);
        self.0 &= !Self::bit(day);
        present
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.into_iter().filter(|day| self.contains(*day))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::new();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl Serialize for WeekdaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for WeekdaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Vec::<Weekday>::deserialize(deserializer)?.into_iter().collect())
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn parse_weekday_code(code: &str) -> Option<Weekday> {
    WEEK.into_iter().find(|day| weekday_code(*day) == code)
}

/// A bounded repeat rule. `frequency: None` is the "no repeat" state: the
/// other fields are kept so the user can pick a frequency later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatRule {
    pub frequency: Option<Frequency>,
    pub interval: u32,
    /// First date of the window (inclusive).
    pub window_start: NaiveDate,
    /// Last date of the window (inclusive).
    pub window_end: NaiveDate,
    #[serde(default)]
    pub weekdays: WeekdaySet,
    #[serde(default)]
    pub hours: BTreeSet<u8>,
    #[serde(default)]
    pub month_days: BTreeSet<u8>,
    #[serde(default = "default_cap")]
    pub occurrence_cap: u16,
}

fn default_cap() -> u16 {
    OCCURRENCE_CAP
}

impl RepeatRule {
    /// A "no repeat" rule over the given window.
    pub fn no_repeat(window_start: NaiveDate, window_end: NaiveDate) -> Self {
        RepeatRule {
            frequency: None,
            interval: 1,
            window_start,
            window_end,
            weekdays: WeekdaySet::new(),
            hours: BTreeSet::new(),
            month_days: BTreeSet::new(),
            occurrence_cap: OCCURRENCE_CAP,
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_weekdays(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.weekdays = days.into_iter().collect();
        self
    }

    pub fn with_hours(mut self, hours: impl IntoIterator<Item = u8>) -> Self {
        self.hours = hours.into_iter().collect();
        self
    }

    pub fn with_month_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.month_days = days.into_iter().collect();
        self
    }

    pub fn is_repeating(&self) -> bool {
        self.frequency.is_some()
    }

    /// Check the rule before anything is expanded or mutated.
    ///
    /// # Errors
    /// Returns [`BookingError::InvalidRule`] for a zero interval, a window that
    /// ends before it starts, a zero cap, or out-of-range hour / month-day
    /// filters.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(BookingError::InvalidRule(
                "interval must be a positive integer".to_string(),
            ));
        }
        if self.window_end < self.window_start {
            return Err(BookingError::InvalidRule(format!(
                "window end {} precedes window start {}",
                self.window_end, self.window_start
            )));
        }
        if self.occurrence_cap == 0 {
            return Err(BookingError::InvalidRule(
                "occurrence cap must be positive".to_string(),
            ));
        }
        if let Some(h) = self.hours.iter().find(|h| **h >= HOURS_PER_DAY) {
            return Err(BookingError::InvalidRule(format!(
                "hour filter value {} outside 0..=23",
                h
            )));
        }
        if let Some(d) = self.month_days.iter().find(|d| !(1..=31).contains(*d)) {
            return Err(BookingError::InvalidRule(format!(
                "month-day filter value {} outside 1..=31",
                d
            )));
        }
        Ok(())
    }

    /// Merge the fields set in `patch` into a copy of this rule.
    pub fn patched(&self, patch: &RepeatPatch) -> RepeatRule {
        let mut rule = self.clone();
        if let Some(choice) = patch.frequency {
            rule.frequency = choice.frequency();
        }
        if let Some(interval) = patch.interval {
            rule.interval = interval;
        }
        if let Some(start) = patch.window_start {
            rule.window_start = start;
        }
        if let Some(end) = patch.window_end {
            rule.window_end = end;
        }
        if let Some(weekdays) = patch.weekdays {
            rule.weekdays = weekdays;
        }
        if let Some(hours) = &patch.hours {
            rule.hours = hours.clone();
        }
        if let Some(days) = &patch.month_days {
            rule.month_days = days.clone();
        }
        rule
    }

    /// Render as iCalendar text (`DTSTART` + `RRULE` lines).
    ///
    /// The occurrence cap is an engine guard and is not written out.
    ///
    /// # Errors
    /// Returns [`BookingError::InvalidRule`] for a "no repeat" rule.
    pub fn to_ical(&self) -> Result<String> {
        let frequency = self.frequency.ok_or_else(|| {
            BookingError::InvalidRule("rule has no repeat frequency".to_string())
        })?;
        Ok(self.ical_text(frequency, true))
    }

    fn ical_text(&self, frequency: Frequency, with_hours: bool) -> String {
        let mut rrule = format!(
            "FREQ={};INTERVAL={};UNTIL={}T235959Z",
            frequency.as_ical(),
            self.interval,
            self.window_end.format("%Y%m%d")
        );
        if frequency.accepts_weekday_filter() && !self.weekdays.is_empty() {
            let days: Vec<&str> = self.weekdays.iter().map(weekday_code).collect();
            let _ = write!(rrule, ";BYDAY={}", days.join(","));
        }
        if !self.month_days.is_empty() {
            let _ = write!(rrule, ";BYMONTHDAY={}", join_numbers(&self.month_days));
        }
        if with_hours && !self.hours.is_empty() {
            let _ = write!(rrule, ";BYHOUR={}", join_numbers(&self.hours));
        }
        rrule.push_str(";WKST=MO");
        format!(
            "DTSTART:{}T000000Z\nRRULE:{}",
            self.window_start.format("%Y%m%d"),
            rrule
        )
    }
}

fn join_numbers(values: &BTreeSet<u8>) -> String {
    values
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl FromStr for RepeatRule {
    type Err = BookingError;

    /// Parse persisted rule text such as
    /// `DTSTART:20211001T000000Z<br>RRULE:UNTIL=20211231T235959Z;FREQ=YEARLY;BYMONTHDAY=29,30;COUNT=10000;WKST=MO`.
    ///
    /// Lines may be separated by newlines or `<br>`. The window is taken from
    /// the date part of `DTSTART` and `UNTIL`; both are required.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |msg: String| BookingError::InvalidRule(msg);
        let normalized = s.replace("<br>", "\n");

        let mut window_start = None;
        let mut rrule_line = None;
        for line in normalized.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(value) = line.strip_prefix("DTSTART:") {
                window_start = Some(parse_ical_date(value)?);
            } else if let Some(value) = line.strip_prefix("RRULE:") {
                rrule_line = Some(value);
            } else {
                return Err(invalid(format!("unexpected line '{}'", line)));
            }
        }
        let window_start = window_start.ok_or_else(|| invalid("missing DTSTART".to_string()))?;
        let rrule_line = rrule_line.ok_or_else(|| invalid("missing RRULE".to_string()))?;

        let mut rule = RepeatRule::no_repeat(window_start, window_start);
        let mut until = None;
        for part in rrule_line.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(format!("malformed RRULE part '{}'", part)))?;
            match key.to_ascii_uppercase().as_str() {
                "FREQ" => rule.frequency = Some(value.parse()?),
                "INTERVAL" => {
                    rule.interval = value
                        .parse()
                        .map_err(|_| invalid(format!("bad INTERVAL '{}'", value)))?;
                }
                "UNTIL" => until = Some(parse_ical_date(value)?),
                "COUNT" => {
                    let count: u32 = value
                        .parse()
                        .map_err(|_| invalid(format!("bad COUNT '{}'", value)))?;
                    rule.occurrence_cap = u16::try_from(count).unwrap_or(u16::MAX);
                }
                "BYDAY" => {
                    rule.weekdays = value
                        .split(',')
                        .map(|code| {
                            parse_weekday_code(code.trim())
                                .ok_or_else(|| invalid(format!("bad BYDAY value '{}'", code)))
                        })
                        .collect::<Result<WeekdaySet>>()?;
                }
                "BYMONTHDAY" => rule.month_days = parse_number_list(value, "BYMONTHDAY")?,
                "BYHOUR" => rule.hours = parse_number_list(value, "BYHOUR")?,
                "WKST" => {
                    if value != "MO" {
                        return Err(invalid(format!(
                            "week start is fixed to MO, got '{}'",
                            value
                        )));
                    }
                }
                other => return Err(invalid(format!("unsupported RRULE part '{}'", other))),
            }
        }
        if rule.frequency.is_none() {
            return Err(invalid("missing FREQ".to_string()));
        }
        rule.window_end = until.ok_or_else(|| invalid("missing UNTIL".to_string()))?;
        rule.validate()?;
        Ok(rule)
    }
}

fn parse_ical_date(value: &str) -> Result<NaiveDate> {
    let date_part = value.split('T').next().unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y%m%d")
        .map_err(|_| BookingError::InvalidRule(format!("bad date '{}'", value)))
}

fn parse_number_list(value: &str, key: &str) -> Result<BTreeSet<u8>> {
    value
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<u8>()
                .map_err(|_| BookingError::InvalidRule(format!("bad {} value '{}'", key, v)))
        })
        .collect()
}

/// Optional field updates for a [`RepeatRule`]; unset fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeatPatch {
    pub frequency: Option<RepeatChoice>,
    pub interval: Option<u32>,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub weekdays: Option<WeekdaySet>,
    pub hours: Option<BTreeSet<u8>>,
    pub month_days: Option<BTreeSet<u8>>,
}

/// Expand `rule` into the time units it blocks under `view`.
///
/// - Month view: each occurrence is a whole date, or, when the rule has an
///   hour filter, one hour unit per filtered hour of that date.
/// - Day and agenda view: the hour filter is not used and every occurrence
///   is the hour unit it starts in.
///
/// Each candidate is passed to `admit` before it is yielded; rejected units
/// are dropped, never retried. A "no repeat" rule yields nothing.
///
/// # Errors
/// Returns [`BookingError::InvalidRule`] if the rule fails validation, or
/// [`BookingError::Expansion`] if the recurrence library rejects the rendered
/// rule.
pub fn expand<F>(
    rule: &RepeatRule,
    view: ViewMode,
    admit: F,
) -> Result<impl Iterator<Item = TimeUnit>>
where
    F: FnMut(&TimeUnit) -> bool,
{
    rule.validate()?;

    let month_view = view == ViewMode::Month;
    let hourly_units = !month_view || !rule.hours.is_empty();
    let starts = match rule.frequency {
        Some(frequency) => occurrence_starts(rule, frequency, month_view)?,
        None => Vec::new(),
    };

    let mut last = None;
    Ok(starts
        .into_iter()
        .map(move |start| {
            if hourly_units {
                TimeUnit::from_datetime(start)
            } else {
                TimeUnit::date(start.date())
            }
        })
        // Hourly rules in month view map many starts onto one date.
        .filter(move |unit| {
            let fresh = last != Some(*unit);
            last = Some(*unit);
            fresh
        })
        .filter(admit))
}

fn occurrence_starts(
    rule: &RepeatRule,
    frequency: Frequency,
    with_hours: bool,
) -> Result<Vec<NaiveDateTime>> {
    let text = rule.ical_text(frequency, with_hours);
    let rrule_set: RRuleSet = text
        .parse()
        .map_err(|e| BookingError::Expansion(format!("{}", e)))?;

    let instances = rrule_set.all(rule.occurrence_cap);
    if instances.dates.len() >= usize::from(rule.occurrence_cap) {
        tracing::debug!(
            cap = rule.occurrence_cap,
            rule = %text.replace('\n', " "),
            "occurrence cap reached, expansion stopped"
        );
    }

    Ok(instances
        .dates
        .into_iter()
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
        .collect())
}

/// Parse compact hour notation such as `"1,3,5,7-11,20-23"`.
///
/// An empty (or all-whitespace) string is the empty set.
///
/// # Errors
/// Returns [`BookingError::InvalidHourRange`] for non-numeric tokens, empty
/// tokens, reversed ranges, or hours above 23.
pub fn parse_hour_ranges(text: &str) -> Result<BTreeSet<u8>> {
    let mut hours = BTreeSet::new();
    if text.trim().is_empty() {
        return Ok(hours);
    }
    let bad = |token: &str| BookingError::InvalidHourRange(token.to_string());
    for token in text.split(',').map(str::trim) {
        let (lo, hi) = match token.split_once('-') {
            Some((lo, hi)) => (lo.trim(), hi.trim()),
            None => (token, token),
        };
        let lo: u8 = lo.parse().map_err(|_| bad(token))?;
        let hi: u8 = hi.parse().map_err(|_| bad(token))?;
        if lo > hi || hi >= HOURS_PER_DAY {
            return Err(bad(token));
        }
        hours.extend(lo..=hi);
    }
    Ok(hours)
}

/// Render hours in compact notation, collapsing consecutive runs:
/// `{1,3,5,7,8,9,10,11}` becomes `"1,3,5,7-11"`.
pub fn format_hour_ranges(hours: &BTreeSet<u8>) -> String {
    let mut runs: Vec<(u8, u8)> = Vec::new();
    for &h in hours {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == h => *end = h,
            _ => runs.push((h, h)),
        }
    }
    runs.iter()
        .map(|&(lo, hi)| {
            if lo == hi {
                lo.to_string()
            } else {
                format!("{}-{}", lo, hi)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
