//! Schema of the capture backend boundary.
//!
//! The daemon sends one [`BackendRequest`] per connection and reads back one
//! [`BackendReply`]. Reply payloads arrive as loosely shaped JSON; every
//! payload is deserialized into a `Raw*` struct and then validated into a
//! core type. A payload with the wrong structure is a [`ShapeError`]; only
//! individual optional fields fall back to defaults.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use fairsight_core::{
    AdapterDescriptor, AdapterName, CurrentTotals, DomainError, HostSummary, LifetimeCounters,
    LiveTrafficSnapshot, PersistedDaySession, ServiceSummary, TrafficSession,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Requests and Replies
// ============================================================================

/// Commands understood by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BackendRequest {
    ListAdapters,
    IsAdapterMonitoring { adapter: AdapterName },
    StartMonitoring { adapter: AdapterName },
    StopMonitoring { adapter: AdapterName },
    GetLiveStats { adapter: AdapterName },
    GetLifetimeCounters,
    GetSessionHistory { start: NaiveDate, end: NaiveDate },
    GetCurrentTotals,
    CheckUnexpectedShutdown,
    GetDailySummaryLog { date: NaiveDate },
    AggregateActivityLogs { dates: Vec<NaiveDate> },
}

impl BackendRequest {
    /// Command name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ListAdapters => "list_adapters",
            Self::IsAdapterMonitoring { .. } => "is_adapter_monitoring",
            Self::StartMonitoring { .. } => "start_monitoring",
            Self::StopMonitoring { .. } => "stop_monitoring",
            Self::GetLiveStats { .. } => "get_live_stats",
            Self::GetLifetimeCounters => "get_lifetime_counters",
            Self::GetSessionHistory { .. } => "get_session_history",
            Self::GetCurrentTotals => "get_current_totals",
            Self::CheckUnexpectedShutdown => "check_unexpected_shutdown",
            Self::GetDailySummaryLog { .. } => "get_daily_summary_log",
            Self::AggregateActivityLogs { .. } => "aggregate_activity_logs",
        }
    }
}

/// A backend reply envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendReply {
    Ok {
        #[serde(default)]
        data: serde_json::Value,
    },
    Error {
        message: String,
    },
}

impl BackendReply {
    pub fn ok(data: serde_json::Value) -> Self {
        Self::Ok { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// A payload did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("{what}: expected {expected}, got {got}")]
    UnexpectedShape {
        what: &'static str,
        expected: &'static str,
        got: String,
    },
}

/// Deserializes a reply payload into `T`, naming the payload in the error.
pub fn decode<T: DeserializeOwned>(
    what: &'static str,
    expected: &'static str,
    data: serde_json::Value,
) -> Result<T, ShapeError> {
    serde_json::from_value(data).map_err(|e| ShapeError::UnexpectedShape {
        what,
        expected,
        got: e.to_string(),
    })
}

fn describe(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(_) => "a boolean".to_string(),
        serde_json::Value::Number(_) => "a number".to_string(),
        serde_json::Value::String(_) => "a string".to_string(),
        serde_json::Value::Array(items) => format!("an array of {}", items.len()),
        serde_json::Value::Object(_) => "an object".to_string(),
    }
}

/// Requires `data` to be a JSON array before element decoding.
pub fn expect_array(what: &'static str, data: &serde_json::Value) -> Result<(), ShapeError> {
    if data.is_array() {
        Ok(())
    } else {
        Err(ShapeError::UnexpectedShape {
            what,
            expected: "an array",
            got: describe(data),
        })
    }
}

// ============================================================================
// Adapters
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawAdapter {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_up: bool,
    #[serde(default)]
    pub is_loopback: bool,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl RawAdapter {
    pub fn validate(self) -> Result<AdapterDescriptor, DomainError> {
        let name = AdapterName::new(self.name);
        if name.is_blank() {
            return Err(DomainError::invalid_field(
                "adapter name",
                name.as_str(),
                "non-empty string",
            ));
        }
        Ok(AdapterDescriptor {
            name,
            description: self.description,
            is_up: self.is_up,
            is_loopback: self.is_loopback,
            addresses: self.addresses,
        })
    }
}

/// Decodes the adapter list. A non-array is a shape error; adapters that
/// fail validation are returned separately so the caller can log them.
pub fn decode_adapters(
    data: serde_json::Value,
) -> Result<(Vec<AdapterDescriptor>, Vec<DomainError>), ShapeError> {
    expect_array("adapter list", &data)?;
    let raw: Vec<RawAdapter> = decode("adapter list", "an array of adapters", data)?;

    let mut adapters = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();
    for adapter in raw {
        match adapter.validate() {
            Ok(a) => adapters.push(a),
            Err(e) => rejected.push(e),
        }
    }
    Ok((adapters, rejected))
}

// ============================================================================
// Live Statistics
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawHost {
    pub ip: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub incoming_bytes: u64,
    #[serde(default)]
    pub outgoing_bytes: u64,
    #[serde(default)]
    pub incoming_packets: u64,
    #[serde(default)]
    pub outgoing_packets: u64,
}

impl From<RawHost> for HostSummary {
    fn from(raw: RawHost) -> Self {
        Self {
            ip: raw.ip,
            hostname: raw.hostname,
            country: raw.country,
            country_code: raw.country_code,
            incoming_bytes: raw.incoming_bytes,
            outgoing_bytes: raw.outgoing_bytes,
            incoming_packets: raw.incoming_packets,
            outgoing_packets: raw.outgoing_packets,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawService {
    pub protocol: String,
    pub port: u16,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub packets: u64,
}

impl From<RawService> for ServiceSummary {
    fn from(raw: RawService) -> Self {
        Self {
            protocol: raw.protocol,
            port: raw.port,
            service_name: raw.service_name,
            bytes: raw.bytes,
            packets: raw.packets,
        }
    }
}

/// Live statistics for one adapter, as the backend reports them.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLiveStats {
    #[serde(default)]
    pub total_incoming_bytes: u64,
    #[serde(default)]
    pub total_outgoing_bytes: u64,
    #[serde(default)]
    pub monitoring_duration: u64,
    #[serde(default)]
    pub network_hosts: Vec<RawHost>,
    #[serde(default)]
    pub services: Vec<RawService>,
}

impl RawLiveStats {
    pub fn into_snapshot(self, captured_at: DateTime<Utc>) -> LiveTrafficSnapshot {
        LiveTrafficSnapshot {
            incoming_bytes: self.total_incoming_bytes,
            outgoing_bytes: self.total_outgoing_bytes,
            hosts: self.network_hosts.into_iter().map(HostSummary::from).collect(),
            services: self.services.into_iter().map(ServiceSummary::from).collect(),
            duration_seconds: self.monitoring_duration,
            captured_at,
        }
    }
}

// ============================================================================
// Lifetime Counters
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawLifetimeEntry {
    #[serde(default)]
    pub lifetime_incoming_bytes: u64,
    #[serde(default)]
    pub lifetime_outgoing_bytes: u64,
    /// Unix seconds.
    #[serde(default)]
    pub first_recorded_time: Option<i64>,
}

/// Decodes the adapter-name keyed counter map into counters sorted by name.
pub fn decode_lifetime_counters(
    data: serde_json::Value,
) -> Result<Vec<LifetimeCounters>, ShapeError> {
    if data.is_null() {
        return Ok(Vec::new());
    }
    if !data.is_object() {
        return Err(ShapeError::UnexpectedShape {
            what: "lifetime counters",
            expected: "an object keyed by adapter name",
            got: describe(&data),
        });
    }
    let raw: HashMap<String, RawLifetimeEntry> =
        decode("lifetime counters", "an object keyed by adapter name", data)?;

    let mut counters: Vec<LifetimeCounters> = raw
        .into_iter()
        .map(|(name, entry)| LifetimeCounters {
            adapter: AdapterName::new(name),
            cumulative_incoming_bytes: entry.lifetime_incoming_bytes,
            cumulative_outgoing_bytes: entry.lifetime_outgoing_bytes,
            first_recorded_time: entry
                .first_recorded_time
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        })
        .collect();
    counters.sort_by(|a, b| a.adapter.cmp(&b.adapter));
    Ok(counters)
}

// ============================================================================
// Session History
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawSession {
    pub adapter_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_incoming_bytes: u64,
    #[serde(default)]
    pub total_outgoing_bytes: u64,
    #[serde(default)]
    pub duration: u64,
}

impl From<RawSession> for TrafficSession {
    fn from(raw: RawSession) -> Self {
        Self {
            adapter: AdapterName::new(raw.adapter_name),
            start_time: raw.start_time,
            end_time: raw.end_time,
            incoming_bytes: raw.total_incoming_bytes,
            outgoing_bytes: raw.total_outgoing_bytes,
            duration_seconds: raw.duration,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDaySummary {
    pub date: NaiveDate,
    #[serde(default)]
    pub sessions: Vec<RawSession>,
    #[serde(default)]
    pub total_incoming_bytes: u64,
    #[serde(default)]
    pub total_outgoing_bytes: u64,
    #[serde(default)]
    pub total_duration: u64,
    #[serde(default)]
    pub unique_hosts: u64,
    #[serde(default)]
    pub unique_services: u64,
}

impl From<RawDaySummary> for PersistedDaySession {
    fn from(raw: RawDaySummary) -> Self {
        Self {
            date: raw.date,
            total_incoming_bytes: raw.total_incoming_bytes,
            total_outgoing_bytes: raw.total_outgoing_bytes,
            sessions: raw.sessions.into_iter().map(TrafficSession::from).collect(),
            unique_hosts: raw.unique_hosts,
            unique_services: raw.unique_services,
            total_duration: raw.total_duration,
        }
    }
}

/// Decodes the per-day session history. A non-array is a shape error.
pub fn decode_session_history(
    data: serde_json::Value,
) -> Result<Vec<PersistedDaySession>, ShapeError> {
    expect_array("session history", &data)?;
    let raw: Vec<RawDaySummary> = decode("session history", "an array of day summaries", data)?;
    Ok(raw.into_iter().map(PersistedDaySession::from).collect())
}

// ============================================================================
// Current Totals
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCombinedTotals {
    #[serde(default)]
    pub total_incoming_bytes: u64,
    #[serde(default)]
    pub total_outgoing_bytes: u64,
    #[serde(default)]
    pub session_incoming_bytes: u64,
    #[serde(default)]
    pub session_outgoing_bytes: u64,
    #[serde(default)]
    pub today_sessions_count: u64,
    #[serde(default)]
    pub active_adapters: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCurrentTotals {
    pub combined_totals: RawCombinedTotals,
}

impl From<RawCurrentTotals> for CurrentTotals {
    fn from(raw: RawCurrentTotals) -> Self {
        let t = raw.combined_totals;
        Self {
            live_incoming_bytes: t.total_incoming_bytes,
            live_outgoing_bytes: t.total_outgoing_bytes,
            session_incoming_bytes: t.session_incoming_bytes,
            session_outgoing_bytes: t.session_outgoing_bytes,
            today_session_count: t.today_sessions_count,
            active_adapters: t.active_adapters,
        }
    }
}

// ============================================================================
// Activity Logs
// ============================================================================

/// Decodes one raw daily log. `null` means the log does not exist.
pub fn decode_log(data: serde_json::Value) -> Result<Option<String>, ShapeError> {
    match data {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(text) => Ok(Some(text)),
        other => Err(ShapeError::UnexpectedShape {
            what: "activity log",
            expected: "a string",
            got: describe(&other),
        }),
    }
}

/// Decodes the batch of raw daily logs. A non-array is a shape error.
pub fn decode_log_batch(data: serde_json::Value) -> Result<Vec<Option<String>>, ShapeError> {
    let serde_json::Value::Array(items) = data else {
        return Err(ShapeError::UnexpectedShape {
            what: "activity log batch",
            expected: "an array",
            got: describe(&data),
        });
    };
    items.into_iter().map(decode_log).collect()
}
