//! End-to-end tests for the calendar session: toggles, navigation, view
//! changes and repeat rules.

use booking_engine::controller::{CalendarController, Direction, Outcome, SessionSnapshot, ViewMode};
use booking_engine::error::BookingError;
use booking_engine::policy::{AvailabilityState, PolicyViolation, Role};
use booking_engine::recurrence::{Frequency, RepeatChoice, RepeatPatch, RepeatRule};
use booking_engine::unit::TimeUnit;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn at(date: NaiveDate, h: u32) -> NaiveDateTime {
    date.and_hms_opt(h, 0, 0).unwrap()
}

fn hour(date: NaiveDate, h: u8) -> TimeUnit {
    TimeUnit::hour(date, h).unwrap()
}

/// A session on 2024-03-01 at 08:00, month view.
fn session() -> CalendarController {
    CalendarController::new(at(d(2024, 3, 1), 8))
}

fn refused(violation: PolicyViolation) -> Outcome {
    Outcome::Refused(violation)
}

// ── Month view toggles ──────────────────────────────────────────────────────

#[test]
fn host_date_toggle_blocks_and_unblocks_all_hours() {
    let mut cal = session();
    let date = d(2024, 3, 15);

    assert!(cal.toggle_unit(TimeUnit::date(date), Role::Host).is_applied());
    assert!(cal.policy().is_fully_blocked(date));
    assert_eq!(cal.blocked().count_for_date(date), 24);

    assert!(cal.toggle_unit(TimeUnit::date(date), Role::Host).is_applied());
    assert_eq!(cal.blocked().count_for_date(date), 0);
    assert!(cal.blocked().is_empty());
}

#[test]
fn host_date_toggle_on_today_skips_past_hours() {
    let mut cal = session();
    let today = d(2024, 3, 1);

    assert!(cal.toggle_unit(TimeUnit::date(today), Role::Host).is_applied());
    assert_eq!(cal.blocked().hours_for_date(today), (8..24).collect::<Vec<u8>>());

    assert!(cal.toggle_unit(TimeUnit::date(today), Role::Host).is_applied());
    assert!(cal.blocked().is_empty());
}

#[test]
fn date_toggle_on_today_keeps_past_blocks() {
    let today = d(2024, 3, 15);
    let mut cal = CalendarController::with_blocked(at(today, 8), [hour(today, 3)]);

    // Only the past hour is blocked, so the toggle blocks the rest of the day.
    assert!(cal.toggle_unit(TimeUnit::date(today), Role::Host).is_applied());
    let mut expected = vec![3u8];
    expected.extend(8..24);
    assert_eq!(cal.blocked().hours_for_date(today), expected);

    assert!(cal.toggle_unit(TimeUnit::date(today), Role::Host).is_applied());
    assert_eq!(cal.blocked().hours_for_date(today), vec![3]);
}

#[test]
fn guest_date_toggle_on_today_keeps_past_bookings() {
    let today = d(2024, 3, 15);
    let mut cal = CalendarController::new(at(today, 8));
    assert!(cal.toggle_unit(TimeUnit::date(today), Role::Guest).is_applied());
    assert_eq!(cal.booked().count_for_date(today), 16);

    // The clock moves on; hours 08..12 are now history.
    cal.set_now(at(today, 12));
    assert!(cal.toggle_unit(TimeUnit::date(today), Role::Guest).is_applied());
    assert_eq!(cal.booked().hours_for_date(today), (8..12).collect::<Vec<u8>>());
}

#[test]
fn hour_unit_in_month_view_acts_on_its_date() {
    let mut cal = session();
    let date = d(2024, 3, 15);

    cal.toggle_unit(hour(date, 9), Role::Host);
    assert_eq!(cal.blocked().count_for_date(date), 24);
}

#[test]
fn toggles_outside_the_window_are_refused() {
    let mut cal = CalendarController::new(at(d(2024, 3, 10), 8));

    for date in [d(2024, 3, 9), d(2024, 4, 1)] {
        assert_eq!(
            cal.toggle_unit(TimeUnit::date(date), Role::Host),
            refused(PolicyViolation::OutOfWindow)
        );
        assert_eq!(
            cal.toggle_unit(TimeUnit::date(date), Role::Guest),
            refused(PolicyViolation::OutOfWindow)
        );
    }
    assert!(cal.blocked().is_empty());
    assert!(cal.booked().is_empty());
}

#[test]
fn today_is_in_window_but_its_past_hours_are_not_booked() {
    let mut cal = CalendarController::new(at(d(2024, 3, 10), 15));
    let today = d(2024, 3, 10);

    assert!(cal.toggle_unit(TimeUnit::date(today), Role::Guest).is_applied());
    assert_eq!(cal.booked().hours_for_date(today), (15..24).collect::<Vec<u8>>());
}

#[test]
fn guest_booking_skips_blocked_hours() {
    let date = d(2024, 3, 20);
    let mut cal = CalendarController::with_blocked(
        at(d(2024, 3, 1), 8),
        (0..6).map(|h| hour(date, h)),
    );
    assert!(cal.policy().is_partially_blocked(date));

    assert!(cal.toggle_unit(TimeUnit::date(date), Role::Guest).is_applied());
    assert_eq!(cal.booked().hours_for_date(date), (6..24).collect::<Vec<u8>>());
    for h in 0..6 {
        assert!(!cal.booked().contains(&hour(date, h)));
    }

    // A second toggle releases the booking.
    assert!(cal.toggle_unit(TimeUnit::date(date), Role::Guest).is_applied());
    assert_eq!(cal.booked().count_for_date(date), 0);
}

#[test]
fn guest_cannot_book_a_fully_blocked_date() {
    let date = d(2024, 3, 20);
    let mut cal = CalendarController::with_blocked(at(d(2024, 3, 1), 8), [TimeUnit::date(date)]);
    assert_eq!(cal.blocked().count_for_date(date), 24);

    assert_eq!(
        cal.toggle_unit(TimeUnit::date(date), Role::Guest),
        refused(PolicyViolation::Blocked)
    );
    assert!(cal.booked().is_empty());
}

#[test]
fn host_date_block_leaves_booked_hours_with_the_guest() {
    let mut cal = session();
    let date = d(2024, 3, 20);
    cal.drill_down(date);
    cal.toggle_unit(hour(date, 10), Role::Guest);
    cal.change_view(ViewMode::Month);

    assert!(cal.toggle_unit(TimeUnit::date(date), Role::Host).is_applied());
    assert_eq!(cal.blocked().count_for_date(date), 23);
    assert!(!cal.blocked().contains(&hour(date, 10)));
    assert!(cal.booked().contains(&hour(date, 10)));

    // Partially blocked, so the next host toggle clears the date.
    assert!(cal.toggle_unit(TimeUnit::date(date), Role::Host).is_applied());
    assert_eq!(cal.blocked().count_for_date(date), 0);
    assert_eq!(cal.booked().count_for_date(date), 1);
}

// ── Day view toggles ────────────────────────────────────────────────────────

#[test]
fn guest_cannot_book_an_hour_the_host_blocked() {
    let mut cal = session();
    let date = d(2024, 3, 15);
    cal.drill_down(date);
    assert_eq!(cal.view_mode(), ViewMode::Day);

    assert!(cal.toggle_unit(hour(date, 14), Role::Host).is_applied());
    assert_eq!(
        cal.toggle_unit(hour(date, 14), Role::Guest),
        refused(PolicyViolation::Blocked)
    );
    assert!(cal.booked().is_empty());
    assert_eq!(
        cal.availability_state(&hour(date, 14), Role::Guest),
        AvailabilityState::FullBlock
    );
}

#[test]
fn host_cannot_block_a_booked_hour() {
    let mut cal = session();
    let date = d(2024, 3, 15);
    cal.drill_down(date);

    assert!(cal.toggle_unit(hour(date, 9), Role::Guest).is_applied());
    assert_eq!(
        cal.toggle_unit(hour(date, 9), Role::Host),
        refused(PolicyViolation::Booked)
    );
    assert!(cal.blocked().is_empty());
}

#[test]
fn hour_toggle_is_an_involution() {
    let mut cal = session();
    let date = d(2024, 3, 15);
    cal.drill_down(date);

    cal.toggle_unit(hour(date, 3), Role::Host);
    cal.toggle_unit(hour(date, 3), Role::Host);
    assert!(cal.blocked().is_empty());

    cal.toggle_unit(hour(date, 3), Role::Guest);
    cal.toggle_unit(hour(date, 3), Role::Guest);
    assert!(cal.booked().is_empty());
}

#[test]
fn past_hours_of_today_are_refused_in_day_view() {
    let mut cal = session();
    cal.drill_down(d(2024, 3, 1));

    assert_eq!(
        cal.toggle_unit(hour(d(2024, 3, 1), 7), Role::Host),
        refused(PolicyViolation::OutOfWindow)
    );
    assert!(cal.toggle_unit(hour(d(2024, 3, 1), 8), Role::Host).is_applied());
}

#[test]
fn agenda_view_is_read_only() {
    let mut cal = session();
    cal.change_view(ViewMode::Agenda);

    assert_eq!(
        cal.toggle_unit(TimeUnit::date(d(2024, 3, 15)), Role::Host),
        refused(PolicyViolation::ReadOnlyView)
    );
    let rule = RepeatRule::no_repeat(d(2024, 3, 15), d(2024, 3, 15)).with_frequency(Frequency::Hourly);
    assert_eq!(
        cal.apply_repeat_rule(rule, Role::Host).unwrap(),
        refused(PolicyViolation::ReadOnlyView)
    );
    assert!(cal.blocked().is_empty());
}

// ── Navigation and views ────────────────────────────────────────────────────

#[test]
fn month_navigation_moves_the_window_and_the_repeat_range() {
    let mut cal = session();

    cal.navigate(Direction::Next);
    assert_eq!(cal.focused_date(), d(2024, 4, 1));
    assert_eq!(cal.repeat_rule().window_start, d(2024, 4, 1));
    assert_eq!(cal.repeat_rule().window_end, d(2024, 4, 30));

    // April is now selectable.
    assert!(cal.toggle_unit(TimeUnit::date(d(2024, 4, 10)), Role::Host).is_applied());

    cal.navigate(Direction::Prev);
    cal.navigate(Direction::Prev);
    assert_eq!(cal.focused_date(), d(2024, 2, 1));
    assert_eq!(cal.blocked().count_for_date(d(2024, 4, 10)), 24);
}

#[test]
fn day_navigation_moves_one_day() {
    let mut cal = session();
    cal.drill_down(d(2024, 3, 31));

    cal.navigate(Direction::Next);
    assert_eq!(cal.focused_date(), d(2024, 4, 1));
    assert_eq!(cal.repeat_rule().window_start, d(2024, 4, 1));
    assert_eq!(cal.repeat_rule().window_end, d(2024, 4, 1));

    cal.navigate(Direction::Prev);
    assert_eq!(cal.focused_date(), d(2024, 3, 31));
}

#[test]
fn changing_view_resets_the_repeat_rule() {
    let mut cal = session();
    let patch = RepeatPatch {
        frequency: Some(RepeatChoice::Weekly),
        weekdays: Some([Weekday::Tue].into_iter().collect()),
        ..RepeatPatch::default()
    };
    cal.set_repeat_rule(&patch, Role::Host).unwrap();
    assert!(cal.repeat_rule().is_repeating());

    cal.change_view(ViewMode::Day);
    assert_eq!(
        cal.repeat_rule(),
        &RepeatRule::no_repeat(d(2024, 3, 1), d(2024, 3, 1))
    );
    // Blocks made by the rule survive the view change.
    assert_eq!(cal.blocked().dates().count(), 4);
}

// ── Repeat rules ────────────────────────────────────────────────────────────

#[test]
fn weekly_monday_rule_blocks_the_mondays_of_march() {
    let mut cal = session();
    let rule = RepeatRule::no_repeat(d(2024, 3, 1), d(2024, 3, 31))
        .with_frequency(Frequency::Weekly)
        .with_weekdays([Weekday::Mon]);

    assert!(cal.apply_repeat_rule(rule, Role::Host).unwrap().is_applied());

    let dates: Vec<NaiveDate> = cal.blocked().dates().collect();
    assert_eq!(dates, vec![d(2024, 3, 4), d(2024, 3, 11), d(2024, 3, 18), d(2024, 3, 25)]);
    for date in dates {
        assert_eq!(date.weekday(), Weekday::Mon);
        assert_eq!(cal.blocked().count_for_date(date), 24);
    }
}

#[test]
fn reapplying_replaces_the_previous_rule() {
    let mut cal = session();
    let monday = RepeatPatch {
        frequency: Some(RepeatChoice::Weekly),
        weekdays: Some([Weekday::Mon].into_iter().collect()),
        ..RepeatPatch::default()
    };
    let tuesday = RepeatPatch {
        weekdays: Some([Weekday::Tue].into_iter().collect()),
        ..RepeatPatch::default()
    };

    cal.set_repeat_rule(&monday, Role::Host).unwrap();
    cal.set_repeat_rule(&tuesday, Role::Host).unwrap();

    assert!(cal
        .blocked()
        .dates()
        .all(|date| date.weekday() == Weekday::Tue));
    assert_eq!(cal.blocked().dates().count(), 4);
}

#[test]
fn hour_filter_in_month_view_blocks_only_those_hours() {
    let mut cal = session();
    let patch = RepeatPatch {
        frequency: Some(RepeatChoice::Weekly),
        weekdays: Some([Weekday::Wed].into_iter().collect()),
        hours: Some([9, 10, 11].into_iter().collect()),
        ..RepeatPatch::default()
    };
    cal.set_repeat_rule(&patch, Role::Host).unwrap();

    let wednesday = d(2024, 3, 13);
    assert_eq!(cal.blocked().hours_for_date(wednesday), vec![9, 10, 11]);
    assert!(cal.policy().is_partially_blocked(wednesday));
}

#[test]
fn hourly_rule_in_day_view_blocks_hours_of_the_focused_date() {
    let mut cal = session();
    let date = d(2024, 3, 15);
    cal.drill_down(date);
    let patch = RepeatPatch {
        frequency: Some(RepeatChoice::Hourly),
        interval: Some(4),
        ..RepeatPatch::default()
    };

    assert!(cal.set_repeat_rule(&patch, Role::Host).unwrap().is_applied());
    assert_eq!(cal.blocked().hours_for_date(date), vec![0, 4, 8, 12, 16, 20]);
    assert_eq!(cal.blocked().dates().count(), 1);
}

#[test]
fn day_view_rule_is_refused_on_a_fully_blocked_date() {
    let mut cal = session();
    let date = d(2024, 3, 15);
    cal.drill_down(date);
    cal.toggle_unit(TimeUnit::date(date), Role::Host);
    let before = cal.snapshot();

    let patch = RepeatPatch {
        frequency: Some(RepeatChoice::Hourly),
        ..RepeatPatch::default()
    };
    assert_eq!(
        cal.set_repeat_rule(&patch, Role::Host).unwrap(),
        refused(PolicyViolation::DateFullyBlocked)
    );
    assert_eq!(cal.snapshot(), before);
}

#[test]
fn guest_cannot_apply_or_reset_rules() {
    let mut cal = session();
    let rule = RepeatRule::no_repeat(d(2024, 3, 1), d(2024, 3, 31)).with_frequency(Frequency::Daily);

    assert_eq!(
        cal.apply_repeat_rule(rule, Role::Guest).unwrap(),
        refused(PolicyViolation::NotPermitted { role: Role::Guest })
    );
    assert_eq!(
        cal.reset_repeat(Role::Guest).unwrap(),
        refused(PolicyViolation::NotPermitted { role: Role::Guest })
    );
    assert!(cal.blocked().is_empty());
}

#[test]
fn invalid_rule_leaves_the_session_unchanged() {
    let mut cal = session();
    cal.toggle_unit(TimeUnit::date(d(2024, 3, 5)), Role::Host);
    let before = cal.snapshot();

    let zero = RepeatPatch {
        frequency: Some(RepeatChoice::Daily),
        interval: Some(0),
        ..RepeatPatch::default()
    };
    assert!(matches!(
        cal.set_repeat_rule(&zero, Role::Host),
        Err(BookingError::InvalidRule(_))
    ));

    let reversed = cal.set_repeat_window(d(2024, 3, 20), d(2024, 3, 10), Role::Host);
    assert!(matches!(reversed, Err(BookingError::InvalidRule(_))));
    assert_eq!(cal.snapshot(), before);
}

#[test]
fn reset_clears_future_blocks_in_the_window_only() {
    let now = at(d(2024, 3, 10), 12);
    let mut cal = CalendarController::with_blocked(
        now,
        [
            TimeUnit::date(d(2024, 3, 5)),
            TimeUnit::date(d(2024, 3, 10)),
            TimeUnit::date(d(2024, 3, 20)),
            TimeUnit::date(d(2024, 4, 2)),
        ],
    );

    assert!(cal.reset_repeat(Role::Host).unwrap().is_applied());

    assert_eq!(cal.blocked().count_for_date(d(2024, 3, 5)), 24);
    assert_eq!(cal.blocked().hours_for_date(d(2024, 3, 10)), (0..12).collect::<Vec<u8>>());
    assert_eq!(cal.blocked().count_for_date(d(2024, 3, 20)), 0);
    assert_eq!(cal.blocked().count_for_date(d(2024, 4, 2)), 24);
    assert!(!cal.repeat_rule().is_repeating());
}

#[test]
fn storing_a_window_without_frequency_does_not_touch_blocks() {
    let mut cal = session();
    cal.toggle_unit(TimeUnit::date(d(2024, 3, 15)), Role::Host);

    let outcome = cal
        .set_repeat_window(d(2024, 3, 10), d(2024, 3, 20), Role::Host)
        .unwrap();
    assert!(outcome.is_applied());
    assert_eq!(cal.repeat_rule().window_start, d(2024, 3, 10));
    assert_eq!(cal.blocked().count_for_date(d(2024, 3, 15)), 24);
}

#[test]
fn rule_window_narrower_than_the_month_keeps_outside_blocks() {
    let mut cal = session();
    cal.toggle_unit(TimeUnit::date(d(2024, 3, 28)), Role::Host);
    let rule = RepeatRule::no_repeat(d(2024, 3, 1), d(2024, 3, 14))
        .with_frequency(Frequency::Daily)
        .with_interval(7);

    cal.apply_repeat_rule(rule, Role::Host).unwrap();

    let dates: Vec<NaiveDate> = cal.blocked().dates().collect();
    assert_eq!(dates, vec![d(2024, 3, 1), d(2024, 3, 8), d(2024, 3, 28)]);
    // Today's past hours stay free.
    assert_eq!(cal.blocked().hours_for_date(d(2024, 3, 1)), (8..24).collect::<Vec<u8>>());
    assert_eq!(cal.blocked().count_for_date(d(2024, 3, 8)), 24);
}

// ── Snapshots ───────────────────────────────────────────────────────────────

#[test]
fn snapshot_survives_json() {
    let mut cal = session();
    cal.toggle_unit(TimeUnit::date(d(2024, 3, 15)), Role::Host);
    cal.toggle_unit(TimeUnit::date(d(2024, 3, 16)), Role::Guest);

    let snapshot = cal.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);

    let mut restored = CalendarController::restore(back);
    assert_eq!(restored.blocked().count_for_date(d(2024, 3, 15)), 24);
    assert!(restored.toggle_unit(TimeUnit::date(d(2024, 3, 15)), Role::Host).is_applied());
    assert!(restored.blocked().is_empty());
}

#[test]
fn loading_blocks_skips_booked_hours() {
    let mut cal = session();
    let date = d(2024, 3, 15);
    cal.drill_down(date);
    assert!(cal.toggle_unit(hour(date, 14), Role::Guest).is_applied());

    cal.load_blocked([TimeUnit::date(date), hour(d(2024, 3, 16), 9)]);
    assert!(cal.policy().is_booked(&hour(date, 14)));
    assert!(!cal.policy().is_blocked(&hour(date, 14)));
    assert_eq!(cal.blocked().count_for_date(date), 23);
    assert!(cal.blocked().contains(&hour(d(2024, 3, 16), 9)));
}

#[test]
fn restore_splits_dates_and_drops_overlapping_bookings() {
    let date = d(2024, 3, 15);
    let mut snapshot = session().snapshot();
    snapshot.blocked.insert_unit(TimeUnit::date(date));
    snapshot.blocked.insert_unit(hour(d(2024, 3, 16), 9));
    snapshot.booked.insert_unit(hour(date, 14));
    snapshot.booked.insert_unit(hour(d(2024, 3, 16), 9));
    snapshot.booked.insert_unit(hour(d(2024, 3, 16), 10));

    let cal = CalendarController::restore(snapshot);
    assert!(!cal.blocked().contains(&TimeUnit::date(date)));
    assert_eq!(cal.blocked().hours_for_date(date), (0..24).collect::<Vec<u8>>());
    assert_eq!(cal.booked().count_for_date(date), 0);
    assert_eq!(cal.booked().hours_for_date(d(2024, 3, 16)), vec![10]);
    for unit in cal.booked().units() {
        assert!(!cal.policy().is_blocked(&unit), "{} is blocked and booked", unit);
    }
}

#[test]
fn outcome_serializes_with_reason() {
    let json = serde_json::to_value(refused(PolicyViolation::Blocked)).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "outcome": "refused", "reason": { "kind": "blocked" } })
    );
    let json = serde_json::to_value(Outcome::Applied).unwrap();
    assert_eq!(json, serde_json::json!({ "outcome": "applied" }));
}
