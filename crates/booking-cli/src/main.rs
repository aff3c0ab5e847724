//! `bookcal` CLI: expand repeat rules, print availability grids, and replay
//! scripted calendar sessions from the command line.
//!
//! ## Usage
//!
//! ```sh
//! # Mondays of March 2024, one unit per line
//! bookcal expand --freq weekly --weekdays mon --from 2024-03-01 --to 2024-03-31
//!
//! # Working hours on weekdays, as JSON
//! bookcal expand --freq daily --weekdays mon,tue,wed,thu,fri --hours 9-17 \
//!   --from 2024-03-01 --to 2024-03-31 --json
//!
//! # Expand a persisted rule
//! bookcal expand --rrule "DTSTART:20240301T000000Z
//! RRULE:FREQ=WEEKLY;INTERVAL=1;UNTIL=20240331T235959Z;BYDAY=MO;WKST=MO"
//!
//! # Month grid for a session described in a TOML file
//! bookcal --config session.toml grid --month 2024-03
//!
//! # Replay a scripted session and print the final snapshot
//! bookcal --today 2024-03-01T08:00 replay -i script.json
//! ```

mod config;
mod script;

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use booking_engine::{
    expand, parse_hour_ranges, CalendarController, Frequency, RepeatRule, Role, TimeUnit,
    ViewMode, WeekdaySet,
};
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{parse_now, Config};

#[derive(Parser)]
#[command(
    name = "bookcal",
    version,
    about = "Calendar availability and booking engine CLI"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file with session defaults (today, role, view, blocked)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session clock, e.g. 2024-03-01T08:00 (defaults to local time)
    #[arg(long, global = true)]
    today: Option<String>,

    /// Acting role: host or guest
    #[arg(long, global = true)]
    role: Option<Role>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a repeat rule into time units
    Expand {
        /// Frequency: yearly, monthly, weekly, daily or hourly
        #[arg(long, required_unless_present = "rrule")]
        freq: Option<Frequency>,
        /// Repeat every N periods
        #[arg(long, default_value_t = 1)]
        interval: u32,
        /// First date of the window (inclusive)
        #[arg(long, required_unless_present = "rrule")]
        from: Option<NaiveDate>,
        /// Last date of the window (inclusive)
        #[arg(long, required_unless_present = "rrule")]
        to: Option<NaiveDate>,
        /// Comma-separated weekdays, e.g. mon,wed,fri
        #[arg(long)]
        weekdays: Option<String>,
        /// Hour filter in range notation, e.g. 9-12,14
        #[arg(long)]
        hours: Option<String>,
        /// Comma-separated days of the month, e.g. 1,15
        #[arg(long)]
        month_days: Option<String>,
        /// iCalendar rule text (DTSTART + RRULE lines) instead of the flags above
        #[arg(long, conflicts_with_all = ["freq", "from", "to", "weekdays", "hours", "month_days"])]
        rrule: Option<String>,
        /// View the units are expanded for: month or day
        #[arg(long, default_value = "month")]
        view: ViewMode,
        /// Print a JSON array instead of one unit per line
        #[arg(long)]
        json: bool,
        /// Print the rule's iCalendar text before the units
        #[arg(long)]
        ical: bool,
    },
    /// Print the availability state of every cell of a month or a day
    Grid {
        /// Month to show, e.g. 2024-03
        #[arg(long, conflicts_with = "day")]
        month: Option<String>,
        /// Day to show hour by hour, e.g. 2024-03-15
        #[arg(long)]
        day: Option<NaiveDate>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Replay a JSON script of session commands and print the final snapshot
    Replay {
        /// Script file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Also print the outcome of every step
        #[arg(long)]
        steps: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match &cli.command {
        Commands::Expand {
            freq,
            interval,
            from,
            to,
            weekdays,
            hours,
            month_days,
            rrule,
            view,
            json,
            ical,
        } => {
            let rule = match rrule {
                Some(text) => text
                    .parse::<RepeatRule>()
                    .context("Failed to parse --rrule")?,
                None => {
                    let (Some(freq), Some(from), Some(to)) = (freq, from, to) else {
                        anyhow::bail!("--freq, --from and --to are required without --rrule");
                    };
                    let mut rule = RepeatRule::no_repeat(*from, *to)
                        .with_frequency(*freq)
                        .with_interval(*interval);
                    if let Some(days) = weekdays {
                        rule.weekdays = parse_weekdays(days)?;
                    }
                    if let Some(h) = hours {
                        rule.hours = parse_hour_ranges(h).context("Invalid --hours")?;
                    }
                    if let Some(days) = month_days {
                        rule.month_days = parse_month_days(days)?;
                    }
                    rule
                }
            };

            if *ical {
                println!("{}", rule.to_ical()?);
            }
            let units: Vec<TimeUnit> = expand(&rule, *view, |_| true)
                .context("Failed to expand rule")?
                .collect();
            tracing::debug!(count = units.len(), "rule expanded");
            if *json {
                let strings: Vec<String> = units.iter().map(TimeUnit::to_string).collect();
                println!("{}", serde_json::to_string_pretty(&strings)?);
            } else {
                for unit in &units {
                    println!("{}", unit);
                }
            }
        }
        Commands::Grid { month, day, json } => {
            let (mut session, role) = build_session(&cli, &config)?;
            match (month, day) {
                (_, Some(day)) => {
                    session.change_view(ViewMode::Day);
                    session.go_to(*day);
                    let cells = session.policy().day_grid(role);
                    if *json {
                        let rows: Vec<GridCell> = cells
                            .iter()
                            .map(|(unit, state)| GridCell {
                                unit: unit.to_string(),
                                state: *state,
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    } else {
                        for (unit, state) in &cells {
                            println!("{}  {}", unit, state_label(*state));
                        }
                    }
                }
                (month, None) => {
                    if let Some(month) = month {
                        session.change_view(ViewMode::Month);
                        session.go_to(parse_month(month)?);
                    }
                    let summaries = session.policy().month_grid(role);
                    if *json {
                        println!("{}", serde_json::to_string_pretty(&summaries)?);
                    } else {
                        for s in &summaries {
                            println!(
                                "{}  {:<14} blocked={:<2} booked={}",
                                s.date,
                                state_label(s.state),
                                s.blocked_hours,
                                s.booked_hours
                            );
                        }
                    }
                }
            }
        }
        Commands::Replay { input, steps } => {
            let (mut session, role) = build_session(&cli, &config)?;
            let text = read_input(input.as_deref())?;
            let script = script::parse_script(&text)?;
            let reports = script::replay(&mut session, &script, role)?;

            let snapshot = session.snapshot();
            let out = if *steps {
                serde_json::to_string_pretty(&serde_json::json!({
                    "steps": reports,
                    "snapshot": snapshot,
                }))?
            } else {
                serde_json::to_string_pretty(&snapshot)?
            };
            println!("{}", out);
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct GridCell {
    unit: String,
    state: booking_engine::AvailabilityState,
}

/// Install the stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

/// Build the session from config values, with flags taking precedence.
fn build_session(cli: &Cli, config: &Config) -> Result<(CalendarController, Role)> {
    let now: NaiveDateTime = match &cli.today {
        Some(today) => parse_now(today).context("Invalid --today")?,
        None => config
            .now()?
            .unwrap_or_else(|| chrono::Local::now().naive_local()),
    };
    let role = cli.role.or(config.role).unwrap_or(Role::Host);

    let mut session = CalendarController::with_blocked(now, config.blocked_units()?);
    if let Some(view) = config.view {
        session.change_view(view);
    }
    tracing::debug!(%now, %role, view = %session.view_mode(), "session ready");
    Ok((session, role))
}

fn parse_weekdays(list: &str) -> Result<WeekdaySet> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Weekday>()
                .map_err(|_| anyhow::anyhow!("Unknown weekday: '{}'", s))
        })
        .collect()
}

fn parse_month_days(list: &str) -> Result<std::collections::BTreeSet<u8>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .with_context(|| format!("Invalid day of month: '{}'", s))
        })
        .collect()
}

/// `2024-03` → 2024-03-01.
fn parse_month(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}': expected YYYY-MM", s))
}

fn state_label(state: booking_engine::AvailabilityState) -> &'static str {
    use booking_engine::AvailabilityState::*;
    match state {
        Available => "available",
        PartialBlock => "partial_block",
        FullBlock => "full_block",
        PartialBooked => "partial_booked",
        Booked => "booked",
        OutOfWindow => "out_of_window",
    }
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}
