//! Boundary to the capture backend.
//!
//! The backend owns packet capture, traffic accounting and persistence. The
//! daemon reaches it only through the [`Backend`] trait; [`SocketBackend`]
//! is the production implementation and tests substitute their own.
//!
//! Every method validates the reply into a core type before returning it,
//! so a malformed payload surfaces as [`BackendError::Shape`] at this seam
//! rather than as a missing field deeper in the daemon.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use fairsight_core::{
    AdapterDescriptor, AdapterName, CurrentTotals, LifetimeCounters, LiveTrafficSnapshot,
    PersistedDaySession,
};
use fairsight_protocol::ShapeError;

mod socket;

pub use socket::SocketBackend;

// ============================================================================
// Backend Errors
// ============================================================================

/// Errors from a single backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached or the connection broke.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// No reply arrived in time.
    #[error("Backend command {command} timed out after {after_ms} ms")]
    Timeout { command: &'static str, after_ms: u64 },

    /// The backend answered with an error.
    #[error("Backend rejected {command}: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },

    /// The reply envelope was not valid JSON.
    #[error("Malformed backend reply: {0}")]
    Protocol(String),

    /// The reply payload had the wrong structure.
    #[error("Unexpected backend data: {0}")]
    Shape(#[from] ShapeError),
}

impl BackendError {
    /// Returns true if the failure is in the data itself rather than in
    /// reaching the backend. Shape errors are not worth retrying per item.
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape(_))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

// ============================================================================
// Backend Trait
// ============================================================================

/// Asynchronous request/response interface to the capture backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_adapters(&self) -> BackendResult<Vec<AdapterDescriptor>>;

    async fn is_adapter_monitoring(&self, adapter: &AdapterName) -> BackendResult<bool>;

    async fn start_monitoring(&self, adapter: &AdapterName) -> BackendResult<()>;

    async fn stop_monitoring(&self, adapter: &AdapterName) -> BackendResult<()>;

    async fn get_live_stats(&self, adapter: &AdapterName) -> BackendResult<LiveTrafficSnapshot>;

    /// Lifetime counters of every adapter the backend has ever recorded.
    async fn get_lifetime_counters(&self) -> BackendResult<Vec<LifetimeCounters>>;

    async fn get_session_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BackendResult<Vec<PersistedDaySession>>;

    async fn get_current_totals(&self) -> BackendResult<CurrentTotals>;

    async fn check_unexpected_shutdown(&self) -> BackendResult<bool>;

    /// Raw log text for one day; `None` if the backend has no log.
    async fn get_daily_summary_log(&self, date: NaiveDate) -> BackendResult<Option<String>>;

    /// Raw logs for several days in one call, in the order requested.
    async fn aggregate_activity_logs(
        &self,
        dates: &[NaiveDate],
    ) -> BackendResult<Vec<Option<String>>>;
}
