//! Daily activity model: supervision intervals and their per-day totals.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Number of seconds in one calendar day.
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Slack allowed above a full day before a data-quality warning is raised.
pub const OVERFLOW_TOLERANCE_SECS: u32 = 60;

// ============================================================================
// Activity State
// ============================================================================

/// Supervision state recorded by the activity logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    /// User was present and active.
    Active,
    /// Machine was on but the user was idle.
    Inactive,
    /// The logger was not running.
    NotRun,
}

impl ActivityState {
    /// Returns the label used in the raw log format.
    #[must_use]
    pub fn log_label(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::NotRun => "Not run",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.log_label())
    }
}

impl FromStr for ActivityState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Active" => Ok(Self::Active),
            "Inactive" => Ok(Self::Inactive),
            "Not run" | "Not Run" | "NotRun" => Ok(Self::NotRun),
            other => Err(DomainError::invalid_field(
                "activity state",
                other,
                "Active, Inactive or Not run",
            )),
        }
    }
}

// ============================================================================
// Activity Interval
// ============================================================================

/// One parsed log line. Only lives while a single day's log is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityInterval {
    pub state: ActivityState,
    /// Seconds since midnight.
    pub start_seconds: u32,
    /// Seconds since midnight, never before `start_seconds`.
    pub end_seconds: u32,
}

impl ActivityInterval {
    /// Length of the interval in seconds.
    #[must_use]
    pub fn duration(&self) -> u32 {
        self.end_seconds.saturating_sub(self.start_seconds)
    }
}

// ============================================================================
// Daily Summary
// ============================================================================

/// Per-day supervision totals.
///
/// Always sums to exactly [`SECONDS_PER_DAY`]. `not_run_seconds` is derived
/// as the remainder of the day, never summed from log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivitySummary {
    #[serde(rename = "active")]
    pub active_seconds: u32,
    #[serde(rename = "inactive")]
    pub inactive_seconds: u32,
    #[serde(rename = "notrun")]
    pub not_run_seconds: u32,
}

impl DailyActivitySummary {
    /// A day with no supervision at all: the logger never ran.
    pub const fn no_supervision() -> Self {
        Self {
            active_seconds: 0,
            inactive_seconds: 0,
            not_run_seconds: SECONDS_PER_DAY,
        }
    }

    /// Builds a summary from summed active and inactive durations.
    ///
    /// Values are clamped so the day totals exactly 86400 seconds; active
    /// time takes precedence over inactive time when the log overlaps.
    pub fn from_durations(active: u64, inactive: u64) -> Self {
        let day = u64::from(SECONDS_PER_DAY);
        let active = active.min(day);
        let inactive = inactive.min(day - active);
        let not_run = day - active - inactive;

        // All three are bounded by `day`, which fits in u32.
        Self {
            active_seconds: u32::try_from(active).unwrap_or(SECONDS_PER_DAY),
            inactive_seconds: u32::try_from(inactive).unwrap_or(0),
            not_run_seconds: u32::try_from(not_run).unwrap_or(0),
        }
    }

    /// Sum of all three categories.
    #[must_use]
    pub fn total_seconds(&self) -> u32 {
        self.active_seconds
            .saturating_add(self.inactive_seconds)
            .saturating_add(self.not_run_seconds)
    }

    /// Seconds the logger was running (active plus inactive).
    #[must_use]
    pub fn supervised_seconds(&self) -> u32 {
        self.active_seconds.saturating_add(self.inactive_seconds)
    }
}

impl Default for DailyActivitySummary {
    fn default() -> Self {
        Self::no_supervision()
    }
}

/// A daily summary tagged with its calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedActivity {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub summary: DailyActivitySummary,
}
