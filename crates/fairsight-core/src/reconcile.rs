//! Merging live lifetime counters with persisted day sessions.
//!
//! Past days are closed and exact once the backend flushes them, so they
//! pass through untouched. Today's persisted sessions are flushed
//! incrementally and may lag behind the counters the backend keeps in memory,
//! so today's byte totals always come from the lifetime counters when any
//! exist.

use chrono::NaiveDate;
use tracing::debug;

use crate::traffic::{LifetimeCounters, PersistedDaySession, ReconciledDaySummary};

/// Byte totals summed over every adapter's lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveTotals {
    pub incoming_bytes: u64,
    pub outgoing_bytes: u64,
}

impl LiveTotals {
    pub fn sum(counters: &[LifetimeCounters]) -> Self {
        counters.iter().fold(Self::default(), |acc, c| Self {
            incoming_bytes: acc.incoming_bytes.saturating_add(c.cumulative_incoming_bytes),
            outgoing_bytes: acc.outgoing_bytes.saturating_add(c.cumulative_outgoing_bytes),
        })
    }
}

/// Builds the reconciled daily view.
///
/// - Days other than `today` are copied unchanged.
/// - Every persisted record dated `today` is folded into a single entry:
///   byte totals, durations and sessions are summed, unique counts take the
///   maximum.
/// - With at least one live counter, today's totals are replaced by the
///   counter sums and the persisted totals move to the `session_*` fields.
///   If today was never flushed, an entry is synthesized and inserted in
///   date order.
/// - With no live counters, every day passes through with
///   `has_real_time_data == false`.
///
/// Output is sorted by date and holds at most one entry for `today`. Inputs
/// are only borrowed.
pub fn reconcile(
    session_days: &[PersistedDaySession],
    live_counters: &[LifetimeCounters],
    today: NaiveDate,
) -> Vec<ReconciledDaySummary> {
    let (today_records, past): (Vec<&PersistedDaySession>, Vec<&PersistedDaySession>) =
        session_days.iter().partition(|d| d.date == today);

    let mut days: Vec<ReconciledDaySummary> =
        past.into_iter().map(ReconciledDaySummary::historical).collect();

    if today_records.len() > 1 {
        debug!(%today, records = today_records.len(), "Merging persisted records for today");
    }
    let mut today_entry = today_records.into_iter().fold(None, |acc, record| match acc {
        None => Some(ReconciledDaySummary::historical(record)),
        Some(mut entry) => {
            merge_record(&mut entry, record);
            Some(entry)
        }
    });

    if live_counters.is_empty() {
        debug!(%today, "No live counters, using persisted sessions only");
    } else {
        let live = LiveTotals::sum(live_counters);
        let entry = today_entry.get_or_insert_with(|| {
            debug!(
                %today,
                live_incoming = live.incoming_bytes,
                "Synthesizing today from live counters"
            );
            empty_day(today)
        });
        debug!(
            %today,
            session_incoming = entry.total_incoming_bytes,
            live_incoming = live.incoming_bytes,
            "Replacing today's session totals with live counters"
        );
        apply_live(entry, live);
    }

    days.extend(today_entry);
    days.sort_by_key(|d| d.date);
    days
}

fn merge_record(entry: &mut ReconciledDaySummary, record: &PersistedDaySession) {
    entry.total_incoming_bytes = entry
        .total_incoming_bytes
        .saturating_add(record.total_incoming_bytes);
    entry.total_outgoing_bytes = entry
        .total_outgoing_bytes
        .saturating_add(record.total_outgoing_bytes);
    entry.total_duration = entry.total_duration.saturating_add(record.total_duration);
    entry.sessions.extend(record.sessions.iter().cloned());
    entry.unique_hosts = entry.unique_hosts.max(record.unique_hosts);
    entry.unique_services = entry.unique_services.max(record.unique_services);
}

fn apply_live(entry: &mut ReconciledDaySummary, live: LiveTotals) {
    entry.session_incoming_bytes = Some(entry.total_incoming_bytes);
    entry.session_outgoing_bytes = Some(entry.total_outgoing_bytes);
    entry.total_incoming_bytes = live.incoming_bytes;
    entry.total_outgoing_bytes = live.outgoing_bytes;
    entry.has_real_time_data = true;
}

fn empty_day(date: NaiveDate) -> ReconciledDaySummary {
    ReconciledDaySummary {
        date,
        total_incoming_bytes: 0,
        total_outgoing_bytes: 0,
        sessions: Vec::new(),
        unique_hosts: 0,
        unique_services: 0,
        total_duration: 0,
        has_real_time_data: false,
        session_incoming_bytes: None,
        session_outgoing_bytes: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterName;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn persisted(d: &str, incoming: u64, outgoing: u64) -> PersistedDaySession {
        PersistedDaySession {
            date: date(d),
            total_incoming_bytes: incoming,
            total_outgoing_bytes: outgoing,
            sessions: Vec::new(),
            unique_hosts: 3,
            unique_services: 2,
            total_duration: 120,
        }
    }

    fn counters(adapter: &str, incoming: u64, outgoing: u64) -> LifetimeCounters {
        LifetimeCounters {
            adapter: AdapterName::new(adapter),
            cumulative_incoming_bytes: incoming,
            cumulative_outgoing_bytes: outgoing,
            first_recorded_time: None,
        }
    }

    #[test]
    fn test_synthesizes_missing_today() {
        let history = vec![persisted("2025-03-09", 500, 50)];
        let live = vec![counters("eth0", 400, 10), counters("wg0", 300, 20)];

        let days = reconcile(&history, &live, date("2025-03-10"));

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date, date("2025-03-09"));
        assert_eq!(days[0].total_incoming_bytes, 500);
        assert!(!days[0].has_real_time_data);

        assert_eq!(days[1].date, date("2025-03-10"));
        assert_eq!(days[1].total_incoming_bytes, 700);
        assert_eq!(days[1].total_outgoing_bytes, 30);
        assert!(days[1].has_real_time_data);
        assert_eq!(days[1].session_incoming_bytes, Some(0));
    }

    #[test]
    fn test_replaces_existing_today_and_keeps_session_totals() {
        let history = vec![persisted("2025-03-09", 500, 50), persisted("2025-03-10", 200, 20)];
        let live = vec![counters("eth0", 900, 90)];

        let days = reconcile(&history, &live, date("2025-03-10"));

        assert_eq!(days.len(), 2);
        let today = &days[1];
        assert_eq!(today.total_incoming_bytes, 900);
        assert_eq!(today.total_outgoing_bytes, 90);
        assert_eq!(today.session_incoming_bytes, Some(200));
        assert_eq!(today.session_outgoing_bytes, Some(20));
        assert_eq!(today.unique_hosts, 3);
        assert!(today.has_real_time_data);
    }

    #[test]
    fn test_duplicate_today_records_become_one_live_entry() {
        let history = vec![
            persisted("2025-03-09", 500, 50),
            persisted("2025-03-10", 200, 20),
            persisted("2025-03-10", 300, 30),
        ];
        let live = vec![counters("eth0", 900, 90)];

        let days = reconcile(&history, &live, date("2025-03-10"));

        assert_eq!(days.len(), 2);
        let today: Vec<_> = days.iter().filter(|d| d.date == date("2025-03-10")).collect();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].total_incoming_bytes, 900);
        assert_eq!(today[0].total_outgoing_bytes, 90);
        assert_eq!(today[0].session_incoming_bytes, Some(500));
        assert_eq!(today[0].session_outgoing_bytes, Some(50));
        assert_eq!(today[0].total_duration, 240);
        assert!(today[0].has_real_time_data);

        let range_incoming: u64 = days.iter().map(|d| d.total_incoming_bytes).sum();
        assert_eq!(range_incoming, 1400);
    }

    #[test]
    fn test_duplicate_today_records_merge_without_live_counters() {
        let mut first = persisted("2025-03-10", 200, 20);
        first.unique_hosts = 7;
        let second = persisted("2025-03-10", 300, 30);

        let days = reconcile(&[first, second], &[], date("2025-03-10"));

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].total_incoming_bytes, 500);
        assert_eq!(days[0].total_outgoing_bytes, 50);
        assert_eq!(days[0].unique_hosts, 7);
        assert!(!days[0].has_real_time_data);
        assert_eq!(days[0].session_incoming_bytes, None);
    }

    #[test]
    fn test_no_live_counters_passes_through() {
        let history = vec![persisted("2025-03-10", 200, 20)];
        let days = reconcile(&history, &[], date("2025-03-10"));

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].total_incoming_bytes, 200);
        assert!(!days[0].has_real_time_data);
        assert_eq!(days[0].session_incoming_bytes, None);
    }

    #[test]
    fn test_no_live_counters_and_no_history() {
        assert!(reconcile(&[], &[], date("2025-03-10")).is_empty());
    }

    #[test]
    fn test_synthesized_today_inserted_in_order() {
        let history = vec![persisted("2025-03-12", 1, 1), persisted("2025-03-08", 1, 1)];
        let live = vec![counters("eth0", 5, 5)];

        let days = reconcile(&history, &live, date("2025-03-10"));
        let dates: Vec<_> = days.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date("2025-03-08"), date("2025-03-10"), date("2025-03-12")]);
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let history = vec![persisted("2025-03-10", 200, 20)];
        let live = vec![counters("eth0", 900, 90)];
        let history_before = history.clone();
        let live_before = live.clone();

        let _ = reconcile(&history, &live, date("2025-03-10"));

        assert_eq!(history, history_before);
        assert_eq!(live, live_before);
    }

    #[test]
    fn test_live_totals_saturate() {
        let live = vec![counters("a", u64::MAX, 1), counters("b", 10, 1)];
        let totals = LiveTotals::sum(&live);
        assert_eq!(totals.incoming_bytes, u64::MAX);
        assert_eq!(totals.outgoing_bytes, 2);
    }
}
