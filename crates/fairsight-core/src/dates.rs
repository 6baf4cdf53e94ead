//! Calendar date ranges and the clock that defines "today".
//!
//! Every series the daemon produces is keyed by [`NaiveDate`] and generated
//! from a [`DateRange`], so labels and values can never drift apart. The
//! current date always comes from a [`Clock`]; nothing else in the workspace
//! reads the wall clock to decide what "today" is.

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Length of the default range shown when no range is requested.
pub const DEFAULT_RANGE_DAYS: u32 = 7;

// ============================================================================
// Date Range
// ============================================================================

/// An inclusive range of calendar days, `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = DomainError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    /// Creates a range, rejecting one whose start is after its end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> DomainResult<Self> {
        if start > end {
            return Err(DomainError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range covering a single day.
    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// The `n` days ending at `today`, inclusive. `n == 0` is treated as 1.
    ///
    /// "Last 7 Days" is `today - 6 ..= today`.
    pub fn last_n_days(today: NaiveDate, n: u32) -> Self {
        let back = u64::from(n.max(1) - 1);
        let start = today.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    /// The range shown when the caller did not choose one.
    pub fn default_for(today: NaiveDate) -> Self {
        Self::last_n_days(today, DEFAULT_RANGE_DAYS)
    }

    /// Builds a range from optional bounds. A missing end is `today`; a
    /// missing start gives the default-length range ending at `end`.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> DomainResult<Self> {
        let end = end.unwrap_or(today);
        match start {
            Some(start) => Self::new(start, end),
            None => Ok(Self::last_n_days(end, DEFAULT_RANGE_DAYS)),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days in the range; always at least 1.
    #[must_use]
    pub fn len_days(&self) -> usize {
        let span = (self.end - self.start).num_days();
        usize::try_from(span).map_or(1, |d| d + 1)
    }

    /// Returns true if `date` falls within the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every day in the range, in chronological order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    /// Every day in the range, formatted as `YYYY-MM-DD` labels.
    pub fn labels(&self) -> Vec<String> {
        self.days().map(format_date).collect()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(text: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|e| DomainError::ParseError {
        field: "date".to_string(),
        reason: format!("'{text}': {e}"),
    })
}

// ============================================================================
// Clock
// ============================================================================

/// Source of the current date and time.
pub trait Clock: Send + Sync {
    /// The calendar date considered "today".
    fn today(&self) -> NaiveDate;

    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock. "Today" is the machine's local calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a fixed date, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }

    fn now(&self) -> DateTime<Utc> {
        self.today
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_default()
    }
}
