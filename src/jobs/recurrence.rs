//! Recurrence evaluation for periodic jobs.
//!
//! Jobs can carry a time-of-day constraint (`"HH:MM"` runs at a fixed time,
//! `"*:MM"` / `"**:MM"` runs at minute `:MM` of every hour), a minimum
//! `period` between runs, and a `stop_at` expiry. The functions here are
//! pure: parsing returns a tagged result and due-ness is computed entirely
//! from the arguments.

use std::sync::OnceLock;

use chrono::{NaiveDateTime, Timelike};
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSpecError {
    #[error("Unrecognized time spec '{0}': expected HH:MM, *:MM, or **:MM")]
    Unrecognized(String),

    #[error("Hour out of range in time spec '{spec}': {hour} (expected 0-23)")]
    HourOutOfRange { spec: String, hour: u32 },

    #[error("Minute out of range in time spec '{spec}': {minute} (expected 0-59)")]
    MinuteOutOfRange { spec: String, minute: u32 },
}

/// A parsed time-of-day constraint.
///
/// `hour` is `None` for the wildcard forms, meaning the constraint matches
/// at minute `:MM` of every hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpec {
    pub hour: Option<u32>,
    pub minute: u32,
}

impl TimeSpec {
    /// Whether the given instant falls inside this constraint's minute.
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.hour.is_none_or(|hour| at.hour() == hour) && at.minute() == self.minute
    }
}

/// Compiled time-spec patterns, cached for reuse across parses
struct SpecPatterns {
    // "H:MM" or "HH:MM"
    fixed: Regex,
    // "*:MM" or "**:MM"
    every_hour: Regex,
}

static SPEC_PATTERNS: OnceLock<SpecPatterns> = OnceLock::new();

fn patterns() -> &'static SpecPatterns {
    SPEC_PATTERNS.get_or_init(|| SpecPatterns {
        fixed: Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap(),
        every_hour: Regex::new(r"^\*{1,2}:(\d{2})$").unwrap(),
    })
}

/// Parses a time-of-day spec.
///
/// Returns `Ok(None)` for an empty/blank spec (no constraint), which is
/// distinct from a malformed spec: anything non-empty that does not match a
/// known form, or whose hour/minute is out of range, is a `TimeSpecError`.
pub fn parse_time_spec(spec: &str) -> Result<Option<TimeSpec>, TimeSpecError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(None);
    }

    if let Some(captures) = patterns().fixed.captures(spec) {
        let (Ok(hour), Ok(minute)) = (captures[1].parse::<u32>(), captures[2].parse::<u32>())
        else {
            return Err(TimeSpecError::Unrecognized(spec.to_string()));
        };
        if hour >= 24 {
            return Err(TimeSpecError::HourOutOfRange {
                spec: spec.to_string(),
                hour,
            });
        }
        if minute >= 60 {
            return Err(TimeSpecError::MinuteOutOfRange {
                spec: spec.to_string(),
                minute,
            });
        }
        return Ok(Some(TimeSpec {
            hour: Some(hour),
            minute,
        }));
    }

    if let Some(captures) = patterns().every_hour.captures(spec) {
        let Ok(minute) = captures[1].parse::<u32>() else {
            return Err(TimeSpecError::Unrecognized(spec.to_string()));
        };
        if minute >= 60 {
            return Err(TimeSpecError::MinuteOutOfRange {
                spec: spec.to_string(),
                minute,
            });
        }
        return Ok(Some(TimeSpec { hour: None, minute }));
    }

    Err(TimeSpecError::Unrecognized(spec.to_string()))
}

/// Decides whether a recurring job is due at `now`.
///
/// Due iff all three hold:
/// 1. never run before, or at least `period` whole seconds elapsed since
///    `last_run_at`;
/// 2. `at_spec` is absent, or `now` falls inside the parsed constraint;
/// 3. `stop_at` is absent or still strictly in the future.
///
/// A malformed `at_spec` propagates as an error rather than reading as "not
/// due": callers must treat it as a data-integrity defect on that job.
pub fn is_due(
    last_run_at: Option<NaiveDateTime>,
    now: NaiveDateTime,
    period: Option<i32>,
    at_spec: Option<&str>,
    stop_at: Option<NaiveDateTime>,
) -> Result<bool, TimeSpecError> {
    if let Some(stop_at) = stop_at {
        if stop_at <= now {
            return Ok(false);
        }
    }

    if let Some(spec) = at_spec {
        if let Some(constraint) = parse_time_spec(spec)? {
            if !constraint.matches(now) {
                return Ok(false);
            }
        }
    }

    if let (Some(last_run_at), Some(period)) = (last_run_at, period) {
        if (now - last_run_at).num_seconds() < i64::from(period) {
            return Ok(false);
        }
    }

    Ok(true)
}
