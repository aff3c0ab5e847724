//! WASM bindings for booking-engine.
//!
//! Exposes a calendar session and repeat-rule expansion to the JavaScript
//! calendar widget via `wasm-bindgen`. All complex types are passed as JSON
//! strings; errors surface as string `JsValue`s.
//!
//! ## Build process
//!
//! ```sh
//! cargo build -p booking-engine-wasm --target wasm32-unknown-unknown --release
//! wasm-bindgen --target web --out-dir packages/booking-engine-js/wasm/ \
//!   target/wasm32-unknown-unknown/release/booking_engine_wasm.wasm
//! ```

use booking_engine::{
    expand, parse_hour_ranges, CalendarController, Direction, Outcome, RepeatPatch, RepeatRule,
    Role, TimeUnit, ViewMode,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

// ---------------------------------------------------------------------------
// Serde-friendly DTOs for crossing the WASM boundary as JSON
// ---------------------------------------------------------------------------

/// A unit as JavaScript sends it: either the compact string form
/// (`"2024-03-15"`, `"2024-03-15T14"`) or the `{date, hour}` object.
#[derive(Deserialize)]
#[serde(untagged)]
enum UnitInput {
    Text(String),
    Object(TimeUnit),
}

impl UnitInput {
    fn into_unit(self) -> Result<TimeUnit, String> {
        match self {
            UnitInput::Text(s) => s.parse().map_err(|e| format!("{}", e)),
            UnitInput::Object(unit) => Ok(unit),
        }
    }
}

#[derive(Serialize)]
struct CellDto {
    unit: String,
    state: booking_engine::AvailabilityState,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| js_err(format!("Serialization error: {}", e)))
}

/// Parse the session clock.
///
/// Accepts a naive local datetime (`"2024-03-01T08:00:00"` or
/// `"2024-03-01T08:00"`) or RFC 3339, whose wall-clock fields are kept and
/// whose offset is dropped.
fn parse_now(s: &str) -> Result<NaiveDateTime, JsValue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map_err(|e| js_err(format!("Invalid datetime '{}': {}", s, e)))
}

/// A unit argument: a JSON value (string or object) or a bare unit string.
fn parse_unit(s: &str) -> Result<TimeUnit, JsValue> {
    let input = serde_json::from_str::<UnitInput>(s).unwrap_or(UnitInput::Text(s.to_string()));
    input.into_unit().map_err(js_err)
}

fn parse_role(s: &str) -> Result<Role, JsValue> {
    s.parse().map_err(js_err)
}

fn parse_view(s: &str) -> Result<ViewMode, JsValue> {
    s.parse().map_err(js_err)
}

// ---------------------------------------------------------------------------
// WASM exports
// ---------------------------------------------------------------------------

/// One interactive calendar session.
///
/// Command methods return the JSON-encoded [`Outcome`], e.g.
/// `{"outcome":"applied"}` or `{"outcome":"refused","reason":{"kind":"blocked"}}`.
#[wasm_bindgen]
pub struct CalendarSession {
    inner: CalendarController,
}

#[wasm_bindgen]
impl CalendarSession {
    /// Start a session focused on the date of `now` in month view.
    #[wasm_bindgen(constructor)]
    pub fn new(now: &str) -> Result<CalendarSession, JsValue> {
        Ok(CalendarSession {
            inner: CalendarController::new(parse_now(now)?),
        })
    }

    /// Restore a session from the JSON produced by [`CalendarSession::snapshot`].
    #[wasm_bindgen(js_name = "fromSnapshot")]
    pub fn from_snapshot(json: &str) -> Result<CalendarSession, JsValue> {
        let snapshot = serde_json::from_str(json)
            .map_err(|e| js_err(format!("Invalid snapshot JSON: {}", e)))?;
        Ok(CalendarSession {
            inner: CalendarController::restore(snapshot),
        })
    }

    /// Load persisted host blocks: a JSON array of units.
    #[wasm_bindgen(js_name = "loadBlocked")]
    pub fn load_blocked(&mut self, json: &str) -> Result<(), JsValue> {
        let inputs: Vec<UnitInput> = serde_json::from_str(json)
            .map_err(|e| js_err(format!("Invalid units JSON: {}", e)))?;
        let units = inputs
            .into_iter()
            .map(UnitInput::into_unit)
            .collect::<Result<Vec<_>, _>>()
            .map_err(js_err)?;
        self.inner.load_blocked(units);
        Ok(())
    }

    #[wasm_bindgen(js_name = "setNow")]
    pub fn set_now(&mut self, now: &str) -> Result<(), JsValue> {
        self.inner.set_now(parse_now(now)?);
        Ok(())
    }

    pub fn toggle(&mut self, unit: &str, role: &str) -> Result<String, JsValue> {
        let outcome = self.inner.toggle_unit(parse_unit(unit)?, parse_role(role)?);
        to_json(&outcome)
    }

    /// `"prev"` or `"next"`.
    pub fn navigate(&mut self, direction: &str) -> Result<String, JsValue> {
        let direction: Direction = direction.parse().map_err(js_err)?;
        to_json(&self.inner.navigate(direction))
    }

    #[wasm_bindgen(js_name = "goTo")]
    pub fn go_to(&mut self, date: &str) -> Result<(), JsValue> {
        let date: NaiveDate = date
            .parse()
            .map_err(|e| js_err(format!("Invalid date '{}': {}", date, e)))?;
        self.inner.go_to(date);
        Ok(())
    }

    /// `"month"`, `"day"` or `"agenda"`.
    #[wasm_bindgen(js_name = "changeView")]
    pub fn change_view(&mut self, mode: &str) -> Result<String, JsValue> {
        to_json(&self.inner.change_view(parse_view(mode)?))
    }

    /// Merge a JSON repeat patch into the current rule, applying it when it
    /// has a frequency.
    #[wasm_bindgen(js_name = "setRepeat")]
    pub fn set_repeat(&mut self, patch: &str, role: &str) -> Result<String, JsValue> {
        let patch: RepeatPatch = serde_json::from_str(patch)
            .map_err(|e| js_err(format!("Invalid repeat JSON: {}", e)))?;
        let outcome: Outcome = self
            .inner
            .set_repeat_rule(&patch, parse_role(role)?)
            .map_err(js_err)?;
        to_json(&outcome)
    }

    #[wasm_bindgen(js_name = "resetRepeat")]
    pub fn reset_repeat(&mut self, role: &str) -> Result<String, JsValue> {
        let outcome = self.inner.reset_repeat(parse_role(role)?).map_err(js_err)?;
        to_json(&outcome)
    }

    /// Availability state of one cell, e.g. `"partial_block"`.
    pub fn availability(&self, unit: &str, role: &str) -> Result<String, JsValue> {
        let state = self
            .inner
            .availability_state(&parse_unit(unit)?, parse_role(role)?);
        to_json(&state)
    }

    /// Per-date summaries of the focused month.
    #[wasm_bindgen(js_name = "monthGrid")]
    pub fn month_grid(&self, role: &str) -> Result<String, JsValue> {
        to_json(&self.inner.policy().month_grid(parse_role(role)?))
    }

    /// Per-hour states of the focused date.
    #[wasm_bindgen(js_name = "dayGrid")]
    pub fn day_grid(&self, role: &str) -> Result<String, JsValue> {
        let cells: Vec<CellDto> = self
            .inner
            .policy()
            .day_grid(parse_role(role)?)
            .into_iter()
            .map(|(unit, state)| CellDto {
                unit: unit.to_string(),
                state,
            })
            .collect();
        to_json(&cells)
    }

    pub fn snapshot(&self) -> Result<String, JsValue> {
        to_json(&self.inner.snapshot())
    }
}

/// Expand a JSON repeat rule under a view mode without touching any
/// session. Returns a JSON array of unit strings.
#[wasm_bindgen(js_name = "expandRule")]
pub fn expand_rule(rule: &str, view: &str) -> Result<String, JsValue> {
    let rule: RepeatRule =
        serde_json::from_str(rule).map_err(|e| js_err(format!("Invalid rule JSON: {}", e)))?;
    let units: Vec<String> = expand(&rule, parse_view(view)?, |_| true)
        .map_err(js_err)?
        .map(|unit| unit.to_string())
        .collect();
    to_json(&units)
}

/// Parse compact hour notation (`"9-12,14"`) into a JSON array of hours.
#[wasm_bindgen(js_name = "parseHourRanges")]
pub fn hour_ranges(text: &str) -> Result<String, JsValue> {
    to_json(&parse_hour_ranges(text).map_err(js_err)?)
}
