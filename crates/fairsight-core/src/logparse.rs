//! Parsing of raw activity-interval logs.
//!
//! The activity logger writes one line per interval:
//!
//! ```text
//! Active: 09:00:00 - 10:00:00
//! Inactive: 10:00:00 - 10:30:00
//! Not run: 10:30:00 - 23:59:59
//! ```
//!
//! Only `Active` and `Inactive` lines are summed. Everything else in the day
//! is reported as not run, so gaps in the log never break the 86400-second
//! total. Malformed lines are skipped with a warning; a bad line never
//! discards the rest of the day.

use thiserror::Error;
use tracing::warn;

use crate::activity::{
    ActivityInterval, ActivityState, DailyActivitySummary, OVERFLOW_TOLERANCE_SECS,
    SECONDS_PER_DAY,
};

/// Substring the backend returns in place of a missing log file.
pub const NOT_FOUND_SENTINEL: &str = "found";

/// Reasons a single log line is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("missing ': ' between state and time range")]
    MissingStateSeparator,

    #[error("unknown activity state '{0}'")]
    UnknownState(String),

    #[error("missing ' - ' in time range")]
    MissingRangeSeparator,

    #[error("invalid time '{0}' (expected HH:MM:SS)")]
    InvalidTime(String),

    #[error("end {end} is before start {start} (intervals spanning midnight are not supported)")]
    EndBeforeStart { start: String, end: String },
}

/// Result of parsing one day's log, with diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLog {
    pub summary: DailyActivitySummary,
    /// Lines that produced an interval.
    pub accepted_lines: usize,
    /// Non-blank lines that were skipped.
    pub skipped_lines: usize,
    /// Active plus inactive exceeded a day by more than the tolerance.
    pub over_budget: bool,
}

impl ParsedLog {
    fn missing() -> Self {
        Self {
            summary: DailyActivitySummary::no_supervision(),
            accepted_lines: 0,
            skipped_lines: 0,
            over_budget: false,
        }
    }
}

/// Parses one day's raw log into its summary.
///
/// A missing log (`None`, blank, or the "not found" sentinel) is a full day
/// of no supervision, not an error.
pub fn parse_log(raw: Option<&str>) -> DailyActivitySummary {
    parse_log_detailed(raw).summary
}

/// Parses one day's raw log, returning line counts and the overflow flag.
pub fn parse_log_detailed(raw: Option<&str>) -> ParsedLog {
    let Some(raw) = raw else {
        return ParsedLog::missing();
    };

    if raw.contains(NOT_FOUND_SENTINEL) {
        return ParsedLog::missing();
    }

    let mut active: u64 = 0;
    let mut inactive: u64 = 0;
    let mut accepted_lines = 0;
    let mut skipped_lines = 0;

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_line(line) {
            Ok(interval) => {
                accepted_lines += 1;
                match interval.state {
                    ActivityState::Active => active += u64::from(interval.duration()),
                    ActivityState::Inactive => inactive += u64::from(interval.duration()),
                    ActivityState::NotRun => {}
                }
            }
            Err(e) => {
                skipped_lines += 1;
                warn!(line = %line, error = %e, "Skipping malformed activity log line");
            }
        }
    }

    let limit = u64::from(SECONDS_PER_DAY + OVERFLOW_TOLERANCE_SECS);
    let over_budget = active + inactive > limit;
    if over_budget {
        warn!(
            active_secs = active,
            inactive_secs = inactive,
            "Activity log accounts for more than 24 hours, clamping"
        );
    }

    ParsedLog {
        summary: DailyActivitySummary::from_durations(active, inactive),
        accepted_lines,
        skipped_lines,
        over_budget,
    }
}

/// Parses a single `<State>: <HH:MM:SS> - <HH:MM:SS>` line.
pub fn parse_line(line: &str) -> Result<ActivityInterval, LineError> {
    let (state, range) = line
        .split_once(": ")
        .ok_or(LineError::MissingStateSeparator)?;

    let state: ActivityState = state
        .parse()
        .map_err(|_| LineError::UnknownState(state.trim().to_string()))?;

    let (start, end) = range
        .split_once(" - ")
        .ok_or(LineError::MissingRangeSeparator)?;

    let start_seconds = parse_time(start)?;
    let end_seconds = parse_time(end)?;

    if end_seconds < start_seconds {
        return Err(LineError::EndBeforeStart {
            start: start.trim().to_string(),
            end: end.trim().to_string(),
        });
    }

    Ok(ActivityInterval {
        state,
        start_seconds,
        end_seconds,
    })
}

/// Parses `HH:MM:SS` into seconds since midnight. `24:00:00` is accepted as
/// the end of the day.
pub fn parse_time(text: &str) -> Result<u32, LineError> {
    let text = text.trim();
    let invalid = || LineError::InvalidTime(text.to_string());

    let mut fields = text.split(':');
    let (Some(h), Some(m), Some(s), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(invalid());
    };

    let number = |field: &str| -> Result<u32, LineError> {
        if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        field.parse::<u32>().map_err(|_| invalid())
    };

    let (hours, minutes, seconds) = (number(h)?, number(m)?, number(s)?);
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    let total = hours
        .checked_mul(3600)
        .and_then(|t| t.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)?;
    if total > SECONDS_PER_DAY {
        return Err(invalid());
    }

    Ok(total)
}
