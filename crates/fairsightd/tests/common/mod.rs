//! Shared test fixtures: an in-memory backend that records every call.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use fairsight_core::{
    AdapterDescriptor, AdapterName, CurrentTotals, LifetimeCounters, LiveTrafficSnapshot,
    PersistedDaySession,
};
use fairsightd::backend::{Backend, BackendError, BackendResult};

/// A backend call, as recorded by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListAdapters,
    IsMonitoring(String),
    Start(String),
    Stop(String),
    LiveStats(String),
    LifetimeCounters,
    SessionHistory(NaiveDate, NaiveDate),
    CurrentTotals,
    CheckShutdown,
    DailyLog(NaiveDate),
    AggregateLogs(usize),
}

#[derive(Default)]
struct MockState {
    adapters: Vec<AdapterDescriptor>,
    monitored: BTreeSet<String>,
    fail_start: BTreeSet<String>,
    fail_stop: BTreeSet<String>,
    fail_list: bool,
    fail_query: BTreeSet<String>,
    list_delay: Option<Duration>,
    start_delay: Option<Duration>,
    stats_delay: Option<Duration>,
    history: Vec<PersistedDaySession>,
    fail_history: bool,
    counters: Vec<LifetimeCounters>,
    fail_counters: bool,
    totals: CurrentTotals,
    logs: BTreeMap<NaiveDate, String>,
    batch: Option<BackendResult<Vec<Option<String>>>>,
    unexpected_shutdown: bool,
    calls: Vec<Call>,
}

/// In-memory backend. Adapters, logs and history are set by the test;
/// every trait call is appended to a call log.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapters(names: &[&str]) -> Self {
        let backend = Self::new();
        backend.set_adapters(names);
        backend
    }

    /// Replaces the adapter list with up adapters of the given names.
    pub fn set_adapters(&self, names: &[&str]) {
        self.state.lock().unwrap().adapters =
            names.iter().map(|n| AdapterDescriptor::new(*n, true)).collect();
    }

    pub fn set_adapter_list(&self, adapters: Vec<AdapterDescriptor>) {
        self.state.lock().unwrap().adapters = adapters;
    }

    pub fn fail_start(&self, name: &str) {
        self.state.lock().unwrap().fail_start.insert(name.to_string());
    }

    pub fn fail_stop(&self, name: &str) {
        self.state.lock().unwrap().fail_stop.insert(name.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_query(&self, name: &str, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.fail_query.insert(name.to_string());
        } else {
            state.fail_query.remove(name);
        }
    }

    /// Makes `list_adapters` take `delay` before replying.
    pub fn delay_list(&self, delay: Duration) {
        self.state.lock().unwrap().list_delay = Some(delay);
    }

    /// Makes `start_monitoring` take `delay` before replying.
    pub fn delay_start(&self, delay: Duration) {
        self.state.lock().unwrap().start_delay = Some(delay);
    }

    /// Makes `get_live_stats` take `delay` before replying.
    pub fn delay_stats(&self, delay: Duration) {
        self.state.lock().unwrap().stats_delay = Some(delay);
    }

    pub fn set_history(&self, history: Vec<PersistedDaySession>) {
        self.state.lock().unwrap().history = history;
    }

    pub fn fail_history(&self, fail: bool) {
        self.state.lock().unwrap().fail_history = fail;
    }

    pub fn set_counters(&self, counters: Vec<LifetimeCounters>) {
        self.state.lock().unwrap().counters = counters;
    }

    pub fn fail_counters(&self, fail: bool) {
        self.state.lock().unwrap().fail_counters = fail;
    }

    pub fn set_totals(&self, totals: CurrentTotals) {
        self.state.lock().unwrap().totals = totals;
    }

    pub fn set_log(&self, date: NaiveDate, log: &str) {
        self.state.lock().unwrap().logs.insert(date, log.to_string());
    }

    /// Overrides the batch reply. Unset, the batch is served from the
    /// per-day logs.
    pub fn set_batch(&self, batch: BackendResult<Vec<Option<String>>>) {
        self.state.lock().unwrap().batch = Some(batch);
    }

    pub fn set_unexpected_shutdown(&self, unexpected: bool) {
        self.state.lock().unwrap().unexpected_shutdown = unexpected;
    }

    pub fn is_monitored(&self, name: &str) -> bool {
        self.state.lock().unwrap().monitored.contains(name)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn unavailable() -> BackendError {
    BackendError::Unavailable("mock failure".to_string())
}

#[async_trait]
impl Backend for MockBackend {
    async fn list_adapters(&self) -> BackendResult<Vec<AdapterDescriptor>> {
        let (reply, delay) = {
            let state = self.record(Call::ListAdapters);
            let reply = if state.fail_list {
                Err(unavailable())
            } else {
                Ok(state.adapters.clone())
            };
            (reply, state.list_delay)
        };
        pause(delay).await;
        reply
    }

    async fn is_adapter_monitoring(&self, adapter: &AdapterName) -> BackendResult<bool> {
        let state = self.record(Call::IsMonitoring(adapter.to_string()));
        if state.fail_query.contains(adapter.as_str()) {
            return Err(unavailable());
        }
        Ok(state.monitored.contains(adapter.as_str()))
    }

    async fn start_monitoring(&self, adapter: &AdapterName) -> BackendResult<()> {
        let delay = {
            let state = self.record(Call::Start(adapter.to_string()));
            if state.fail_start.contains(adapter.as_str()) {
                return Err(BackendError::Rejected {
                    command: "start_monitoring",
                    message: "permission denied".to_string(),
                });
            }
            state.start_delay
        };
        pause(delay).await;
        self.state
            .lock()
            .unwrap()
            .monitored
            .insert(adapter.to_string());
        Ok(())
    }

    async fn stop_monitoring(&self, adapter: &AdapterName) -> BackendResult<()> {
        let mut state = self.record(Call::Stop(adapter.to_string()));
        if state.fail_stop.contains(adapter.as_str()) {
            return Err(unavailable());
        }
        state.monitored.remove(adapter.as_str());
        Ok(())
    }

    async fn get_live_stats(&self, adapter: &AdapterName) -> BackendResult<LiveTrafficSnapshot> {
        let delay = self.record(Call::LiveStats(adapter.to_string())).stats_delay;
        pause(delay).await;
        Ok(snapshot(1000, 500))
    }

    async fn get_lifetime_counters(&self) -> BackendResult<Vec<LifetimeCounters>> {
        let state = self.record(Call::LifetimeCounters);
        if state.fail_counters {
            return Err(unavailable());
        }
        Ok(state.counters.clone())
    }

    async fn get_session_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BackendResult<Vec<PersistedDaySession>> {
        let state = self.record(Call::SessionHistory(start, end));
        if state.fail_history {
            return Err(unavailable());
        }
        Ok(state
            .history
            .iter()
            .filter(|d| d.date >= start && d.date <= end)
            .cloned()
            .collect())
    }

    async fn get_current_totals(&self) -> BackendResult<CurrentTotals> {
        let state = self.record(Call::CurrentTotals);
        Ok(state.totals)
    }

    async fn check_unexpected_shutdown(&self) -> BackendResult<bool> {
        let state = self.record(Call::CheckShutdown);
        Ok(state.unexpected_shutdown)
    }

    async fn get_daily_summary_log(&self, date: NaiveDate) -> BackendResult<Option<String>> {
        let state = self.record(Call::DailyLog(date));
        Ok(state.logs.get(&date).cloned())
    }

    async fn aggregate_activity_logs(
        &self,
        dates: &[NaiveDate],
    ) -> BackendResult<Vec<Option<String>>> {
        let state = self.record(Call::AggregateLogs(dates.len()));
        if let Some(batch) = &state.batch {
            return batch.clone();
        }
        Ok(dates.iter().map(|d| state.logs.get(d).cloned()).collect())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn snapshot(incoming: u64, outgoing: u64) -> LiveTrafficSnapshot {
    LiveTrafficSnapshot {
        incoming_bytes: incoming,
        outgoing_bytes: outgoing,
        hosts: Vec::new(),
        services: Vec::new(),
        duration_seconds: 60,
        captured_at: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
    }
}

pub fn day(date: NaiveDate, incoming: u64, outgoing: u64) -> PersistedDaySession {
    PersistedDaySession {
        date,
        total_incoming_bytes: incoming,
        total_outgoing_bytes: outgoing,
        sessions: Vec::new(),
        unique_hosts: 3,
        unique_services: 2,
        total_duration: 3600,
    }
}

pub fn counters(adapter: &str, incoming: u64, outgoing: u64) -> LifetimeCounters {
    LifetimeCounters {
        adapter: AdapterName::new(adapter),
        cumulative_incoming_bytes: incoming,
        cumulative_outgoing_bytes: outgoing,
        first_recorded_time: None,
    }
}
