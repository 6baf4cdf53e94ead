//! Traffic data model: live snapshots, lifetime counters, persisted day
//! sessions and the reconciled daily view built from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::AdapterName;

/// Incoming-byte difference above which live and session totals are
/// reported as disagreeing.
pub const DISCREPANCY_THRESHOLD_BYTES: u64 = 1024;

/// Saved session count for today above which consolidation is suggested.
pub const CONSOLIDATION_THRESHOLD_SESSIONS: u64 = 100;

// ============================================================================
// Live Data
// ============================================================================

/// A remote host seen by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSummary {
    pub ip: String,
    pub hostname: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub incoming_bytes: u64,
    pub outgoing_bytes: u64,
    pub incoming_packets: u64,
    pub outgoing_packets: u64,
}

impl HostSummary {
    pub fn total_bytes(&self) -> u64 {
        self.incoming_bytes.saturating_add(self.outgoing_bytes)
    }
}

/// A protocol/port pair seen by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub protocol: String,
    pub port: u16,
    pub service_name: Option<String>,
    pub bytes: u64,
    pub packets: u64,
}

/// The most recent live statistics for one adapter.
///
/// Replaced wholesale on every successful poll; no history is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTrafficSnapshot {
    pub incoming_bytes: u64,
    pub outgoing_bytes: u64,
    pub hosts: Vec<HostSummary>,
    pub services: Vec<ServiceSummary>,
    pub duration_seconds: u64,
    /// When the daemon received this snapshot.
    pub captured_at: DateTime<Utc>,
}

impl LiveTrafficSnapshot {
    pub fn total_bytes(&self) -> u64 {
        self.incoming_bytes.saturating_add(self.outgoing_bytes)
    }

    /// Hosts ordered by total bytes, largest first.
    pub fn top_hosts(&self, limit: usize) -> Vec<&HostSummary> {
        let mut hosts: Vec<&HostSummary> = self.hosts.iter().collect();
        hosts.sort_by(|a, b| b.total_bytes().cmp(&a.total_bytes()).then(a.ip.cmp(&b.ip)));
        hosts.truncate(limit);
        hosts
    }
}

/// Backend-maintained monotonic byte totals for one adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeCounters {
    pub adapter: AdapterName,
    pub cumulative_incoming_bytes: u64,
    pub cumulative_outgoing_bytes: u64,
    pub first_recorded_time: Option<DateTime<Utc>>,
}

// ============================================================================
// Persisted History
// ============================================================================

/// One contiguous monitoring interval flushed to storage by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSession {
    pub adapter: AdapterName,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub incoming_bytes: u64,
    pub outgoing_bytes: u64,
    pub duration_seconds: u64,
}

/// A calendar day of traffic as persisted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDaySession {
    pub date: NaiveDate,
    pub total_incoming_bytes: u64,
    pub total_outgoing_bytes: u64,
    pub sessions: Vec<TrafficSession>,
    pub unique_hosts: u64,
    pub unique_services: u64,
    pub total_duration: u64,
}

/// A day in the reconciled traffic view.
///
/// Identical to the persisted record for past days. For today the byte
/// totals come from the lifetime counters, and the persisted totals are kept
/// in `session_incoming_bytes` / `session_outgoing_bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledDaySummary {
    pub date: NaiveDate,
    pub total_incoming_bytes: u64,
    pub total_outgoing_bytes: u64,
    pub sessions: Vec<TrafficSession>,
    pub unique_hosts: u64,
    pub unique_services: u64,
    pub total_duration: u64,
    pub has_real_time_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_incoming_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_outgoing_bytes: Option<u64>,
}

impl ReconciledDaySummary {
    /// Copies a persisted day unchanged.
    pub fn historical(day: &PersistedDaySession) -> Self {
        Self {
            date: day.date,
            total_incoming_bytes: day.total_incoming_bytes,
            total_outgoing_bytes: day.total_outgoing_bytes,
            sessions: day.sessions.clone(),
            unique_hosts: day.unique_hosts,
            unique_services: day.unique_services,
            total_duration: day.total_duration,
            has_real_time_data: false,
            session_incoming_bytes: None,
            session_outgoing_bytes: None,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_incoming_bytes
            .saturating_add(self.total_outgoing_bytes)
    }
}

// ============================================================================
// Range Statistics
// ============================================================================

/// Totals over a range of reconciled days.
///
/// Byte, duration and session counts are summed. Unique hosts and services
/// are the daily maximum, since the same host is usually seen on many days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRangeStats {
    pub total_incoming_bytes: u64,
    pub total_outgoing_bytes: u64,
    pub total_duration: u64,
    pub total_sessions: u64,
    pub max_unique_hosts: u64,
    pub max_unique_services: u64,
    pub days_with_live_data: u32,
}

impl TrafficRangeStats {
    pub fn from_days(days: &[ReconciledDaySummary]) -> Self {
        days.iter().fold(Self::default(), |acc, day| Self {
            total_incoming_bytes: acc
                .total_incoming_bytes
                .saturating_add(day.total_incoming_bytes),
            total_outgoing_bytes: acc
                .total_outgoing_bytes
                .saturating_add(day.total_outgoing_bytes),
            total_duration: acc.total_duration.saturating_add(day.total_duration),
            total_sessions: acc.total_sessions.saturating_add(day.session_count() as u64),
            max_unique_hosts: acc.max_unique_hosts.max(day.unique_hosts),
            max_unique_services: acc.max_unique_services.max(day.unique_services),
            days_with_live_data: acc
                .days_with_live_data
                .saturating_add(u32::from(day.has_real_time_data)),
        })
    }
}

// ============================================================================
// Current Totals
// ============================================================================

/// Today's totals as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTotals {
    /// Sum of lifetime counters over all adapters.
    pub live_incoming_bytes: u64,
    pub live_outgoing_bytes: u64,
    /// Sum of today's persisted sessions.
    pub session_incoming_bytes: u64,
    pub session_outgoing_bytes: u64,
    pub today_session_count: u64,
    pub active_adapters: u32,
}

/// Live versus persisted totals for today, with the derived flags the UI
/// needs. Live totals are authoritative when the two disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsComparison {
    pub totals: CurrentTotals,
    /// Live minus session incoming bytes (negative if sessions are ahead).
    pub incoming_difference: i64,
    pub outgoing_difference: i64,
    pub discrepancy: bool,
    pub consolidation_suggested: bool,
}

impl TotalsComparison {
    pub fn from_totals(totals: CurrentTotals) -> Self {
        let incoming_difference =
            signed_difference(totals.live_incoming_bytes, totals.session_incoming_bytes);
        let outgoing_difference =
            signed_difference(totals.live_outgoing_bytes, totals.session_outgoing_bytes);

        Self {
            totals,
            incoming_difference,
            outgoing_difference,
            discrepancy: incoming_difference.unsigned_abs() > DISCREPANCY_THRESHOLD_BYTES,
            consolidation_suggested: totals.today_session_count
                > CONSOLIDATION_THRESHOLD_SESSIONS,
        }
    }
}

fn signed_difference(a: u64, b: u64) -> i64 {
    if a >= b {
        i64::try_from(a - b).unwrap_or(i64::MAX)
    } else {
        i64::try_from(b - a).map_or(i64::MIN, |d| -d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(date: &str, incoming: u64, sessions: usize, hosts: u64) -> ReconciledDaySummary {
        let date: NaiveDate = date.parse().unwrap();
        let session = TrafficSession {
            adapter: AdapterName::new("eth0"),
            start_time: date.and_hms_opt(8, 0, 0).unwrap().and_utc(),
            end_time: None,
            incoming_bytes: 1,
            outgoing_bytes: 1,
            duration_seconds: 60,
        };
        ReconciledDaySummary {
            date,
            total_incoming_bytes: incoming,
            total_outgoing_bytes: incoming / 2,
            sessions: vec![session; sessions],
            unique_hosts: hosts,
            unique_services: hosts / 2,
            total_duration: 60 * sessions as u64,
            has_real_time_data: false,
            session_incoming_bytes: None,
            session_outgoing_bytes: None,
        }
    }

    #[test]
    fn test_range_stats_sum_and_max() {
        let mut today = day("2025-01-02", 300, 1, 4);
        today.has_real_time_data = true;
        let stats = TrafficRangeStats::from_days(&[day("2025-01-01", 1000, 3, 10), today]);

        assert_eq!(stats.total_incoming_bytes, 1300);
        assert_eq!(stats.total_outgoing_bytes, 650);
        assert_eq!(stats.total_sessions, 4);
        assert_eq!(stats.total_duration, 240);
        assert_eq!(stats.max_unique_hosts, 10);
        assert_eq!(stats.max_unique_services, 5);
        assert_eq!(stats.days_with_live_data, 1);
    }

    #[test]
    fn test_range_stats_empty() {
        assert_eq!(TrafficRangeStats::from_days(&[]), TrafficRangeStats::default());
    }

    #[test]
    fn test_totals_discrepancy_threshold() {
        let mut totals = CurrentTotals {
            live_incoming_bytes: 5000,
            session_incoming_bytes: 5000 - 1024,
            ..CurrentTotals::default()
        };
        assert!(!TotalsComparison::from_totals(totals).discrepancy);

        totals.session_incoming_bytes = 5000 - 1025;
        let comparison = TotalsComparison::from_totals(totals);
        assert!(comparison.discrepancy);
        assert_eq!(comparison.incoming_difference, 1025);

        totals.session_incoming_bytes = 7000;
        let comparison = TotalsComparison::from_totals(totals);
        assert!(comparison.discrepancy);
        assert_eq!(comparison.incoming_difference, -2000);
    }

    #[test]
    fn test_totals_consolidation_threshold() {
        let totals = CurrentTotals {
            today_session_count: 100,
            ..CurrentTotals::default()
        };
        assert!(!TotalsComparison::from_totals(totals).consolidation_suggested);

        let totals = CurrentTotals {
            today_session_count: 101,
            ..CurrentTotals::default()
        };
        assert!(TotalsComparison::from_totals(totals).consolidation_suggested);
    }

    #[test]
    fn test_top_hosts_ordering() {
        let host = |ip: &str, bytes: u64| HostSummary {
            ip: ip.to_string(),
            hostname: None,
            country: None,
            country_code: None,
            incoming_bytes: bytes,
            outgoing_bytes: 0,
            incoming_packets: 0,
            outgoing_packets: 0,
        };
        let snapshot = LiveTrafficSnapshot {
            incoming_bytes: 0,
            outgoing_bytes: 0,
            hosts: vec![host("10.0.0.1", 5), host("10.0.0.2", 50), host("10.0.0.3", 20)],
            services: Vec::new(),
            duration_seconds: 0,
            captured_at: DateTime::<Utc>::default(),
        };
        let top: Vec<&str> = snapshot.top_hosts(2).iter().map(|h| h.ip.as_str()).collect();
        assert_eq!(top, vec!["10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_historical_summary_skips_session_fields() {
        let json = serde_json::to_value(day("2025-01-01", 10, 0, 0)).unwrap();
        assert!(json.get("session_incoming_bytes").is_none());
        assert_eq!(json["has_real_time_data"], false);
    }
}
