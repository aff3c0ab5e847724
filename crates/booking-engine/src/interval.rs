//! Single-unit intervals and the set that holds them.
//!
//! Every interval covers exactly one hour or one date. Multi-unit spans are
//! stored as several intervals, which is what lets partial-day detection work
//! by plain cardinality. The set is keyed by date and keeps one 24-bit hour
//! mask per date, so membership is exactly-once by construction and
//! [`IntervalSet::count_for_date`] is a single map lookup.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::unit::{month_end, month_start, TimeUnit, HOURS_PER_DAY};

const FULL_DAY_MASK: u32 = (1 << HOURS_PER_DAY) - 1;

/// The occupied span of one time unit. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IntervalRepr")]
pub struct Interval {
    start: TimeUnit,
    end: NaiveDateTime,
}

// `end` is derived from the unit, so it is ignored on input.
#[derive(Deserialize)]
struct IntervalRepr {
    start: TimeUnit,
}

impl From<IntervalRepr> for Interval {
    fn from(repr: IntervalRepr) -> Self {
        Interval::of(repr.start)
    }
}

impl Interval {
    pub fn of(unit: TimeUnit) -> Self {
        Interval {
            start: unit,
            end: unit.end_of_unit(),
        }
    }

    pub fn unit(&self) -> TimeUnit {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }
}

impl From<TimeUnit> for Interval {
    fn from(unit: TimeUnit) -> Self {
        Interval::of(unit)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DaySlots {
    whole_day: bool,
    hours: u32,
}

impl DaySlots {
    fn is_empty(&self) -> bool {
        !self.whole_day && self.hours == 0
    }

    fn len(&self) -> usize {
        usize::from(self.whole_day) + self.hours.count_ones() as usize
    }
}

fn hour_bit(hour: u8) -> u32 {
    1 << hour
}

fn day_units(date: NaiveDate, slots: DaySlots) -> impl Iterator<Item = TimeUnit> {
    let whole = slots.whole_day.then(|| TimeUnit::date(date));
    whole.into_iter().chain(
        TimeUnit::hours_of(date)
            .filter(move |u| matches!(u.hour_of(), Ok(h) if slots.hours & hour_bit(h) != 0)),
    )
}

/// An ordered, duplicate-free collection of single-unit intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    days: BTreeMap<NaiveDate, DaySlots>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff an interval for exactly this unit (same granularity and
    /// position) is present. A date interval does not make its hours
    /// "contained" here; that relation belongs to the availability policy.
    pub fn contains(&self, unit: &TimeUnit) -> bool {
        let Some(slots) = self.days.get(&unit.date_of()) else {
            return false;
        };
        match unit.hour_of() {
            Ok(h) => slots.hours & hour_bit(h) != 0,
            Err(_) => slots.whole_day,
        }
    }

    /// Insert an interval. Returns `false` if it was already present.
    pub fn insert(&mut self, interval: Interval) -> bool {
        self.insert_unit(interval.unit())
    }

    pub fn insert_unit(&mut self, unit: TimeUnit) -> bool {
        let slots = self.days.entry(unit.date_of()).or_default();
        match unit.hour_of() {
            Ok(h) => {
                let bit = hour_bit(h);
                let fresh = slots.hours & bit == 0;
                slots.hours |= bit;
                fresh
            }
            Err(_) => !std::mem::replace(&mut slots.whole_day, true),
        }
    }

    /// Remove the interval for this unit. Returns `false` if it was absent.
    pub fn remove(&mut self, unit: &TimeUnit) -> bool {
        let date = unit.date_of();
        let Some(slots) = self.days.get_mut(&date) else {
            return false;
        };
        let removed = match unit.hour_of() {
            Ok(h) => {
                let bit = hour_bit(h);
                let present = slots.hours & bit != 0;
                slots.hours &= !bit;
                present
            }
            Err(_) => std::mem::replace(&mut slots.whole_day, false),
        };
        if slots.is_empty() {
            self.days.remove(&date);
        }
        removed
    }

    /// Number of hour intervals on `date` (0..=24). Date intervals are not
    /// counted.
    pub fn count_for_date(&self, date: NaiveDate) -> u8 {
        self.days
            .get(&date)
            .map_or(0, |slots| slots.hours.count_ones() as u8)
    }

    /// Hours present on `date`, ascending.
    pub fn hours_for_date(&self, date: NaiveDate) -> Vec<u8> {
        let mask = self.days.get(&date).map_or(0, |slots| slots.hours);
        (0..HOURS_PER_DAY)
            .filter(|h| mask & hour_bit(*h) != 0)
            .collect()
    }

    /// Insert the 24 hour intervals of `date`. Returns how many were new.
    pub fn put_all_hours_for_date(&mut self, date: NaiveDate) -> usize {
        let slots = self.days.entry(date).or_default();
        let added = (FULL_DAY_MASK & !slots.hours).count_ones() as usize;
        slots.hours = FULL_DAY_MASK;
        added
    }

    /// Drop every interval (date or hour) on `date`. Returns how many went.
    pub fn remove_all_for_date(&mut self, date: NaiveDate) -> usize {
        self.days.remove(&date).map_or(0, |slots| slots.len())
    }

    /// Drop every interval in the month containing `date`.
    pub fn remove_all_for_month(&mut self, date: NaiveDate) -> usize {
        self.remove_all_between(month_start(date)..=month_end(date))
    }

    /// Drop every interval whose date falls in `dates`.
    pub fn remove_all_between(&mut self, dates: RangeInclusive<NaiveDate>) -> usize {
        if dates.is_empty() {
            return 0;
        }
        let removed = self
            .days
            .range(dates.clone())
            .map(|(_, slots)| slots.len())
            .sum();
        self.days.retain(|date, _| !dates.contains(date));
        removed
    }

    /// Dates that carry at least one interval, ascending.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }

    /// Every unit in chronological order (a date interval before its hours).
    pub fn units(&self) -> impl Iterator<Item = TimeUnit> + '_ {
        self.days.iter().flat_map(|(date, slots)| day_units(*date, *slots))
    }

    /// Units whose date falls in `dates`, in chronological order.
    pub fn units_between(
        &self,
        dates: RangeInclusive<NaiveDate>,
    ) -> impl Iterator<Item = TimeUnit> + '_ {
        let days = if dates.is_empty() {
            None
        } else {
            Some(self.days.range(dates))
        };
        days.into_iter()
            .flatten()
            .flat_map(|(date, slots)| day_units(*date, *slots))
    }

    pub fn iter(&self) -> impl Iterator<Item = Interval> + '_ {
        self.units().map(Interval::of)
    }

    /// Total number of intervals.
    pub fn len(&self) -> usize {
        self.days.values().map(DaySlots::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn clear(&mut self) {
        self.days.clear();
    }
}

impl Extend<TimeUnit> for IntervalSet {
    fn extend<I: IntoIterator<Item = TimeUnit>>(&mut self, iter: I) {
        for unit in iter {
            self.insert_unit(unit);
        }
    }
}

impl FromIterator<TimeUnit> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = TimeUnit>>(iter: I) -> Self {
        let mut set = IntervalSet::new();
        set.extend(iter);
        set
    }
}

impl Serialize for IntervalSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for IntervalSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let intervals = Vec::<Interval>::deserialize(deserializer)?;
        Ok(intervals.into_iter().map(|i| i.unit()).collect())
    }
}
