//! Daily activity aggregation over a date range.
//!
//! Produces exactly one summary per day of the range, in order, so the
//! series always lines up with the range's date labels. Logs are fetched
//! with one batch call; if the batch fails or comes back misaligned, each
//! day is fetched on its own and a day that still fails is reported as a
//! full day of no supervision.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

use fairsight_core::{logparse, DailyActivitySummary, DateRange, DatedActivity};

use crate::backend::{Backend, BackendError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivityError {
    /// The backend returned logs in a structure that cannot be read.
    #[error("invalid activity data structure: {0}")]
    InvalidData(#[source] BackendError),
}

/// Builds activity series from the backend's raw daily logs.
#[derive(Clone)]
pub struct ActivityAggregator {
    backend: Arc<dyn Backend>,
}

impl ActivityAggregator {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Summarizes every day in `range`. Recomputed from scratch on every call.
    ///
    /// # Errors
    ///
    /// `ActivityError::InvalidData` if the batch reply is not an array of
    /// logs. Unreachable backends and missing days never fail the call.
    pub async fn aggregate(&self, range: DateRange) -> Result<Vec<DatedActivity>, ActivityError> {
        let dates: Vec<NaiveDate> = range.days().collect();

        let logs = match self.backend.aggregate_activity_logs(&dates).await {
            Ok(logs) if logs.len() == dates.len() => logs,
            Ok(logs) => {
                warn!(
                    expected = dates.len(),
                    got = logs.len(),
                    "Activity batch misaligned with range, fetching days individually"
                );
                self.fetch_each(&dates).await
            }
            Err(e) if e.is_shape() => return Err(ActivityError::InvalidData(e)),
            Err(e) => {
                warn!(error = %e, "Activity batch failed, fetching days individually");
                self.fetch_each(&dates).await
            }
        };

        let series = dates
            .into_iter()
            .zip(logs)
            .map(|(date, log)| DatedActivity {
                date,
                summary: summarize(date, log.as_deref()),
            })
            .collect();

        Ok(series)
    }

    /// One backend call per day. A failing day yields `None`, which parses
    /// as a day with no supervision.
    async fn fetch_each(&self, dates: &[NaiveDate]) -> Vec<Option<String>> {
        let mut logs = Vec::with_capacity(dates.len());
        for &date in dates {
            match self.backend.get_daily_summary_log(date).await {
                Ok(log) => logs.push(log),
                Err(e) => {
                    warn!(%date, error = %e, "Failed to fetch activity log, using default");
                    logs.push(None);
                }
            }
        }
        logs
    }
}

fn summarize(date: NaiveDate, log: Option<&str>) -> DailyActivitySummary {
    let parsed = logparse::parse_log_detailed(log);
    if parsed.skipped_lines > 0 || parsed.over_budget {
        debug!(
            %date,
            skipped = parsed.skipped_lines,
            over_budget = parsed.over_budget,
            "Activity log had data-quality issues"
        );
    }
    parsed.summary
}
