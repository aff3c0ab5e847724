//! Scripted sessions for `bookcal replay`.
//!
//! A script is a JSON array of steps, each tagged by `cmd`:
//!
//! ```json
//! [
//!   {"cmd": "toggle", "unit": "2024-03-15"},
//!   {"cmd": "view", "mode": "day"},
//!   {"cmd": "go_to", "date": "2024-03-15"},
//!   {"cmd": "toggle", "unit": "2024-03-15T14", "role": "guest"},
//!   {"cmd": "repeat", "patch": {"frequency": "weekly", "weekdays": ["Mon"]}},
//!   {"cmd": "window", "start": "2024-03-01", "end": "2024-03-15"},
//!   {"cmd": "reset"},
//!   {"cmd": "navigate", "direction": "next"}
//! ]
//! ```
//!
//! Steps without a `role` act as the session's default role.

use anyhow::{Context, Result};
use booking_engine::{
    CalendarController, Direction, Outcome, RepeatPatch, Role, TimeUnit, ViewMode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::parse_now;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Step {
    Toggle {
        unit: String,
        role: Option<Role>,
    },
    Navigate {
        direction: Direction,
    },
    View {
        mode: ViewMode,
    },
    GoTo {
        date: NaiveDate,
    },
    Repeat {
        patch: RepeatPatch,
        role: Option<Role>,
    },
    Window {
        start: NaiveDate,
        end: NaiveDate,
        role: Option<Role>,
    },
    Reset {
        role: Option<Role>,
    },
    Now {
        now: String,
    },
}

/// What one step did, for the replay report.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub outcome: Outcome,
}

pub fn parse_script(json: &str) -> Result<Vec<Step>> {
    serde_json::from_str(json).context("Failed to parse replay script")
}

/// Run every step in order. Refusals are recorded and replay continues;
/// invalid input (a bad unit or rule) stops the replay.
pub fn replay(
    session: &mut CalendarController,
    steps: &[Step],
    default_role: Role,
) -> Result<Vec<StepReport>> {
    let mut reports = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        let step_no = i + 1;
        let outcome = run_step(session, step, default_role)
            .with_context(|| format!("Replay step {} failed", step_no))?;
        if let Outcome::Refused(violation) = outcome {
            tracing::debug!(step = step_no, %violation, "step refused");
        }
        reports.push(StepReport {
            step: step_no,
            outcome,
        });
    }
    Ok(reports)
}

fn run_step(session: &mut CalendarController, step: &Step, default_role: Role) -> Result<Outcome> {
    let role = |r: &Option<Role>| r.unwrap_or(default_role);
    let outcome = match step {
        Step::Toggle { unit, role: r } => {
            let unit: TimeUnit = unit.parse()?;
            session.toggle_unit(unit, role(r))
        }
        Step::Navigate { direction } => session.navigate(*direction),
        Step::View { mode } => session.change_view(*mode),
        Step::GoTo { date } => {
            session.go_to(*date);
            Outcome::Applied
        }
        Step::Repeat { patch, role: r } => session.set_repeat_rule(patch, role(r))?,
        Step::Window { start, end, role: r } => session.set_repeat_window(*start, *end, role(r))?,
        Step::Reset { role: r } => session.reset_repeat(role(r))?,
        Step::Now { now } => {
            session.set_now(parse_now(now)?);
            Outcome::Applied
        }
    };
    Ok(outcome)
}
