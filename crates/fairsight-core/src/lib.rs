//! Fairsight Core - Shared types for activity and traffic reconciliation
//!
//! This crate provides the domain types and pure algorithms shared between
//! the daemon (fairsightd) and the command-line client (fairsight): the
//! interval log parser, date ranges and the clock, the traffic model and
//! the reconciliation of live counters with persisted history.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod activity;
pub mod adapter;
pub mod dates;
pub mod error;
pub mod format;
pub mod logparse;
pub mod reconcile;
pub mod shutdown;
pub mod traffic;

// Re-exports for convenience
pub use activity::{
    ActivityInterval, ActivityState, DailyActivitySummary, DatedActivity, SECONDS_PER_DAY,
};
pub use adapter::{AdapterDescriptor, AdapterName, MonitoringState};
pub use dates::{format_date, parse_date, Clock, DateRange, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use format::{format_bytes, format_duration};
pub use logparse::{parse_log, parse_log_detailed, LineError, ParsedLog};
pub use reconcile::{reconcile, LiveTotals};
pub use shutdown::ShutdownStatus;
pub use traffic::{
    CurrentTotals, HostSummary, LifetimeCounters, LiveTrafficSnapshot, PersistedDaySession,
    ReconciledDaySummary, ServiceSummary, TotalsComparison, TrafficRangeStats, TrafficSession,
};
