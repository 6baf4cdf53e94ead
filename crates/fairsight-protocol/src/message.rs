//! Messages exchanged between UI clients and the daemon.
//!
//! One JSON object per line. Requests carry the client's protocol version
//! alongside a `type` tag; responses and pushed events are tagged the same
//! way.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use fairsight_core::{
    AdapterDescriptor, AdapterName, DatedActivity, LiveTrafficSnapshot, MonitoringState,
    ReconciledDaySummary, ShutdownStatus, TotalsComparison, TrafficRangeStats,
};
use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;

/// Request payloads a client can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Handshake; must be the first message on a connection.
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Daily activity summaries. Both bounds default to the last 7 days.
    GetActivity {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<NaiveDate>,
    },

    /// Reconciled traffic history. Both bounds default to the last 7 days.
    GetTrafficHistory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<NaiveDate>,
    },

    GetAdapters,
    GetMonitoringStates,
    GetLiveSnapshots,
    GetShutdownStatus,
    GetCurrentTotals,

    StartMonitoring { adapter: AdapterName },
    StopMonitoring { adapter: AdapterName },

    /// Run an adapter discovery pass now.
    Discover,

    /// Receive lifecycle events as they happen.
    Subscribe,
    Unsubscribe,

    Ping { seq: u64 },
    Disconnect,
}

/// A request from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn get_activity(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self::new(MessageType::GetActivity { start, end })
    }

    pub fn get_traffic_history(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self::new(MessageType::GetTrafficHistory { start, end })
    }

    pub fn start_monitoring(adapter: impl Into<AdapterName>) -> Self {
        Self::new(MessageType::StartMonitoring {
            adapter: adapter.into(),
        })
    }

    pub fn stop_monitoring(adapter: impl Into<AdapterName>) -> Self {
        Self::new(MessageType::StopMonitoring {
            adapter: adapter.into(),
        })
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }
}

/// Outcome of one adapter discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Adapters seen for the first time.
    pub added: Vec<AdapterName>,
    /// Adapters that disappeared since the previous pass.
    pub removed: Vec<AdapterName>,
    /// Adapters whose monitoring was started.
    pub started: Vec<AdapterName>,
    /// Adapters whose monitoring was stopped.
    pub stopped: Vec<AdapterName>,
    /// Adapters whose start or stop failed.
    pub failed: Vec<AdapterName>,
    /// The adapter list itself could not be fetched; previous state was kept.
    #[serde(default)]
    pub list_failed: bool,
}

impl DiscoveryReport {
    /// Returns true if the pass changed nothing.
    pub fn is_quiet(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.started.is_empty()
            && self.stopped.is_empty()
            && self.failed.is_empty()
            && !self.list_failed
    }
}

/// Responses and pushed events from the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// One entry per day of the requested range, in order.
    ActivitySeries { days: Vec<DatedActivity> },

    TrafficHistory {
        days: Vec<ReconciledDaySummary>,
        stats: TrafficRangeStats,
    },

    /// The history fetch failed as a whole; the client may retry.
    HistoryUnavailable { message: String },

    Adapters { adapters: Vec<AdapterDescriptor> },

    MonitoringStates {
        states: BTreeMap<AdapterName, MonitoringState>,
    },

    LiveSnapshots {
        snapshots: BTreeMap<AdapterName, LiveTrafficSnapshot>,
    },

    ShutdownStatus { status: ShutdownStatus },

    CurrentTotals { comparison: TotalsComparison },

    /// Reply to a manual start or stop.
    MonitoringChanged {
        adapter: AdapterName,
        state: MonitoringState,
    },

    DiscoveryComplete { report: DiscoveryReport },

    // Pushed to subscribers.
    AdapterAppeared { adapter: AdapterDescriptor },
    AdapterRemoved { adapter: AdapterName },
    AdapterStateChanged {
        adapter: AdapterName,
        state: MonitoringState,
    },
    SnapshotUpdated {
        adapter: AdapterName,
        snapshot: Box<LiveTrafficSnapshot>,
    },

    Pong { seq: u64 },

    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }

    /// Returns true for messages pushed to subscribers rather than sent as
    /// a reply.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Self::AdapterAppeared { .. }
                | Self::AdapterRemoved { .. }
                | Self::AdapterStateChanged { .. }
                | Self::SnapshotUpdated { .. }
        )
    }
}
