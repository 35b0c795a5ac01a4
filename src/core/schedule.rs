//! Schedule definitions and next-occurrence calculation.
//!
//! A job fires either once at a fixed UTC instant or repeatedly on a cron
//! cadence. Cron expressions accept the standard 5-field form (a seconds
//! field of `0` is prepended) or the extended 6-field form with seconds.
//! Occurrences are evaluated in the schedule's timezone (UTC by default)
//! and converted back to UTC.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when validating or evaluating schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The schedule has no upcoming occurrence.
    #[error("no upcoming occurrence")]
    NoUpcomingOccurrence,
}

/// When a job fires: exactly once, or on every matching cron tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire once at the given UTC instant, then retire.
    OneTime { at: DateTime<Utc> },

    /// Fire on every matching cron tick.
    Recurring {
        cron: String,
        #[serde(default = "default_timezone")]
        timezone: String,
    },
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Discriminant of a [`Schedule`], used for introspection listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    OneTime,
    Recurring,
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleKind::OneTime => write!(f, "one_time"),
            ScheduleKind::Recurring => write!(f, "recurring"),
        }
    }
}

impl Schedule {
    /// Create a one-time schedule for the given UTC instant.
    pub fn one_time(at: DateTime<Utc>) -> Self {
        Schedule::OneTime { at }
    }

    /// Create a recurring schedule evaluated in UTC.
    pub fn recurring(cron: impl Into<String>) -> Self {
        Schedule::Recurring {
            cron: cron.into(),
            timezone: default_timezone(),
        }
    }

    /// Create a recurring schedule evaluated in a specific timezone.
    pub fn recurring_in(cron: impl Into<String>, timezone: impl Into<String>) -> Self {
        Schedule::Recurring {
            cron: cron.into(),
            timezone: timezone.into(),
        }
    }

    /// Which kind of schedule this is.
    pub fn kind(&self) -> ScheduleKind {
        match self {
            Schedule::OneTime { .. } => ScheduleKind::OneTime,
            Schedule::Recurring { .. } => ScheduleKind::Recurring,
        }
    }

    /// Check the schedule is well-formed. An elapsed one-time instant is
    /// not malformed: arming it fires immediately, whether the job is new
    /// or re-armed from the store.
    pub fn ensure_parsable(&self) -> Result<(), ScheduleError> {
        match self {
            Schedule::OneTime { .. } => Ok(()),
            Schedule::Recurring { cron, timezone } => {
                parse_timezone(timezone)?;
                parse_cron(cron)?;
                Ok(())
            }
        }
    }

    /// Get the next occurrence strictly after the given time.
    ///
    /// For one-time schedules this is `at` while it is still in the future;
    /// once it has elapsed there is no upcoming occurrence.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        match self {
            Schedule::OneTime { at } => {
                if *at > after {
                    Ok(*at)
                } else {
                    Err(ScheduleError::NoUpcomingOccurrence)
                }
            }
            Schedule::Recurring { cron, timezone } => {
                let tz = parse_timezone(timezone)?;
                let schedule = parse_cron(cron)?;
                let local = after.with_timezone(&tz);
                schedule
                    .after(&local)
                    .next()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or(ScheduleError::NoUpcomingOccurrence)
            }
        }
    }

    /// Get the next N occurrences after the given time.
    pub fn next_n_after(
        &self,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        match self {
            Schedule::OneTime { at } => {
                if *at > after {
                    Ok(vec![*at])
                } else {
                    Ok(Vec::new())
                }
            }
            Schedule::Recurring { cron, timezone } => {
                let tz = parse_timezone(timezone)?;
                let schedule = parse_cron(cron)?;
                let local = after.with_timezone(&tz);
                Ok(schedule
                    .after(&local)
                    .take(n)
                    .map(|dt| dt.with_timezone(&Utc))
                    .collect())
            }
        }
    }
}

fn parse_timezone(timezone: &str) -> Result<Tz, ScheduleError> {
    timezone
        .parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))
}

/// Parse a cron expression, normalizing 5-field form to the 6-field form
/// the parser expects.
fn parse_cron(expression: &str) -> Result<CronSchedule, ScheduleError> {
    let trimmed = expression.trim();
    let fields = trimmed.split_whitespace().count();

    let normalized = match fields {
        // Standard 5-field cron, add a seconds field.
        5 => format!("0 {}", trimmed),
        // Extended 6-field cron with seconds.
        6 => trimmed.to_string(),
        _ => {
            return Err(ScheduleError::InvalidCron(format!(
                "expected 5 or 6 fields, got {}",
                fields
            )));
        }
    };

    CronSchedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron(e.to_string()))
}
