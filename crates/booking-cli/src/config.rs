//! Session defaults loaded from a TOML file.
//!
//! ```toml
//! today = "2024-03-01T08:00"
//! role = "host"
//! view = "month"
//! blocked = ["2024-03-20", "2024-03-21T09"]
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use booking_engine::{Role, TimeUnit, ViewMode};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Defaults for a CLI session. Command-line flags override every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The session clock, `YYYY-MM-DDTHH:MM[:SS]`. Defaults to the local time.
    pub today: Option<String>,
    pub role: Option<Role>,
    pub view: Option<ViewMode>,
    /// Previously persisted host blocks, as unit strings.
    pub blocked: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(today) = &self.today {
            parse_now(today)?;
        }
        self.blocked_units()?;
        Ok(())
    }

    pub fn now(&self) -> Result<Option<NaiveDateTime>> {
        self.today.as_deref().map(parse_now).transpose()
    }

    pub fn blocked_units(&self) -> Result<Vec<TimeUnit>> {
        self.blocked
            .iter()
            .map(|s| {
                s.parse::<TimeUnit>()
                    .with_context(|| format!("Invalid blocked unit '{}'", s))
            })
            .collect()
    }
}

/// Parse a session clock value. Seconds are optional.
pub fn parse_now(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    bail!("Invalid datetime '{}': expected YYYY-MM-DDTHH:MM", s)
}
