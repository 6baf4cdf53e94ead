//! Reconciled traffic history and today's totals.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use fairsight_core::{
    reconcile, Clock, DateRange, LifetimeCounters, ReconciledDaySummary, TotalsComparison,
    TrafficRangeStats,
};

use crate::backend::{Backend, BackendError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// The session history could not be fetched or read.
    #[error("traffic history unavailable: {0}")]
    HistoryUnavailable(#[source] BackendError),

    #[error("current totals unavailable: {0}")]
    TotalsUnavailable(#[source] BackendError),
}

/// Reconciled days for a range, with their aggregate statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryView {
    pub range: DateRange,
    pub days: Vec<ReconciledDaySummary>,
    pub stats: TrafficRangeStats,
}

/// Fetches persisted history and overlays live counters on today.
#[derive(Clone)]
pub struct TrafficHistory {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
}

impl TrafficHistory {
    pub fn new(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Returns the reconciled view of `range`.
    ///
    /// Live counters are only fetched when the range includes today. If
    /// that fetch fails, the persisted data is returned as-is.
    ///
    /// # Errors
    ///
    /// `HistoryError::HistoryUnavailable` if the session history itself
    /// cannot be fetched or has the wrong shape.
    pub async fn fetch(&self, range: DateRange) -> Result<HistoryView, HistoryError> {
        let sessions = self
            .backend
            .get_session_history(range.start(), range.end())
            .await
            .map_err(|e| {
                warn!(%range, error = %e, "Failed to fetch session history");
                HistoryError::HistoryUnavailable(e)
            })?;

        let today = self.clock.today();
        let counters = if range.contains(today) {
            self.live_counters().await
        } else {
            Vec::new()
        };

        let days: Vec<ReconciledDaySummary> = reconcile(&sessions, &counters, today)
            .into_iter()
            .filter(|day| range.contains(day.date))
            .collect();
        let stats = TrafficRangeStats::from_days(&days);

        debug!(
            %range,
            days = days.len(),
            live_adapters = counters.len(),
            "Reconciled traffic history"
        );

        Ok(HistoryView { range, days, stats })
    }

    /// Today's live and persisted totals, compared.
    pub async fn current_totals(&self) -> Result<TotalsComparison, HistoryError> {
        let totals = self
            .backend
            .get_current_totals()
            .await
            .map_err(HistoryError::TotalsUnavailable)?;
        let comparison = TotalsComparison::from_totals(totals);
        if comparison.discrepancy {
            debug!(
                difference = comparison.incoming_difference,
                "Live and session totals disagree, live totals are authoritative"
            );
        }
        Ok(comparison)
    }

    async fn live_counters(&self) -> Vec<LifetimeCounters> {
        match self.backend.get_lifetime_counters().await {
            Ok(counters) => counters,
            Err(e) => {
                warn!(error = %e, "Lifetime counters unavailable, using persisted sessions only");
                Vec::new()
            }
        }
    }
}
