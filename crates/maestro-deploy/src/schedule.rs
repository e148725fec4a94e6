//! Schedule kinds: cron expressions (5- or 6-field) and plain intervals,
//! each carrying a timezone.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use maestro_core::MaestroError;
use serde::{Deserialize, Serialize};

/// Interval granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl IntervalUnit {
    /// One unit as a duration.
    #[must_use]
    pub fn as_duration(self) -> Duration {
        match self {
            Self::Seconds => Duration::from_secs(1),
            Self::Minutes => Duration::from_secs(60),
            Self::Hours => Duration::from_secs(3600),
            Self::Days => Duration::from_secs(86_400),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

/// A deployment's firing schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Cron expression (5 fields, or 6 with leading seconds).
    Cron {
        /// The expression.
        expression: String,
        /// IANA timezone name.
        #[serde(default = "default_timezone")]
        timezone: String,
        /// Whether the schedule fires.
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    /// Fixed interval.
    Interval {
        /// Count of units between fires.
        every: u64,
        /// Unit.
        unit: IntervalUnit,
        /// IANA timezone name (kept for display; intervals are absolute).
        #[serde(default = "default_timezone")]
        timezone: String,
        /// Whether the schedule fires.
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
}

impl Schedule {
    /// Whether this schedule should hold a scheduler registration.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Cron { enabled, .. } | Self::Interval { enabled, .. } => *enabled,
        }
    }

    /// Parse a stored JSON schedule.
    pub fn parse(json: &str) -> Result<Self, MaestroError> {
        let schedule: Self = serde_json::from_str(json)
            .map_err(|e| MaestroError::ScheduleInvalid(format!("bad schedule json: {e}")))?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Validate expression, interval, and timezone.
    pub fn validate(&self) -> Result<(), MaestroError> {
        match self {
            Self::Cron {
                expression,
                timezone,
                ..
            } => {
                let _ = parse_timezone(timezone)?;
                let _ = parse_cron(expression)?;
            }
            Self::Interval {
                every, timezone, ..
            } => {
                let _ = parse_timezone(timezone)?;
                if *every == 0 {
                    return Err(MaestroError::ScheduleInvalid(
                        "interval count must be positive".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Next fire time strictly after `after`.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, MaestroError> {
        match self {
            Self::Cron {
                expression,
                timezone,
                ..
            } => {
                let tz = parse_timezone(timezone)?;
                let schedule = parse_cron(expression)?;
                let local = after.with_timezone(&tz);
                Ok(schedule
                    .after(&local)
                    .next()
                    .map(|t| t.with_timezone(&Utc)))
            }
            Self::Interval { every, unit, .. } => {
                let step = unit
                    .as_duration()
                    .checked_mul(u32::try_from(*every).unwrap_or(u32::MAX))
                    .unwrap_or(Duration::MAX);
                let step = chrono::Duration::from_std(step)
                    .map_err(|e| MaestroError::ScheduleInvalid(e.to_string()))?;
                Ok(after.checked_add_signed(step))
            }
        }
    }
}

fn parse_timezone(name: &str) -> Result<Tz, MaestroError> {
    Tz::from_str(name)
        .map_err(|_| MaestroError::ScheduleInvalid(format!("unknown timezone {name}")))
}

/// Parse a cron expression, accepting the standard 5-field form by
/// prepending a seconds field.
fn parse_cron(expression: &str) -> Result<cron::Schedule, MaestroError> {
    let fields = expression.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {expression}")
    } else {
        expression.to_owned()
    };
    cron::Schedule::from_str(&normalized)
        .map_err(|e| MaestroError::ScheduleInvalid(format!("bad cron expression: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
