//! Lifecycle actor - owns adapter, monitoring and snapshot state.
//!
//! The actor is the only writer of monitoring state. It runs one loop that
//! multiplexes the discovery timer, the poll timer and client commands, so
//! every state change happens on a single task. An adapter whose monitoring
//! status cannot be queried is treated as not monitored until the next
//! discovery pass.
//!
//! # Timers
//!
//! The discovery timer runs for the actor's whole life. The poll timer
//! exists only while at least one adapter is `Monitoring`: it is created or
//! dropped at the top of every loop iteration from the current state, never
//! toggled from inside a handler, so it can neither leak nor be duplicated.
//!
//! # Cancellation
//!
//! When the token is cancelled the loop exits and both timers are dropped.
//! A backend call already in flight is allowed to finish, but its result is
//! discarded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fairsight_core::{AdapterDescriptor, AdapterName, LiveTrafficSnapshot, MonitoringState};
use fairsight_protocol::DiscoveryReport;

use super::commands::{LifecycleCommand, LifecycleError, LifecycleEvent};
use crate::backend::Backend;

/// Timer periods for the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub discovery_interval: Duration,
    pub poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(15),
            poll_interval: Duration::from_secs(2),
        }
    }
}

// ============================================================================
// Lifecycle Actor
// ============================================================================

pub struct MonitorActor {
    receiver: mpsc::Receiver<LifecycleCommand>,
    backend: Arc<dyn Backend>,
    config: LifecycleConfig,
    cancel: CancellationToken,

    /// Adapters from the most recent successful discovery, by name.
    adapters: BTreeMap<AdapterName, AdapterDescriptor>,
    /// Exactly one entry per adapter in `adapters`.
    states: BTreeMap<AdapterName, MonitoringState>,
    /// Last successful poll per adapter.
    snapshots: BTreeMap<AdapterName, LiveTrafficSnapshot>,

    /// Present only while some adapter is `Monitoring`.
    poll_timer: Option<Interval>,

    event_publisher: broadcast::Sender<LifecycleEvent>,
}

impl MonitorActor {
    pub fn new(
        receiver: mpsc::Receiver<LifecycleCommand>,
        backend: Arc<dyn Backend>,
        config: LifecycleConfig,
        cancel: CancellationToken,
        event_publisher: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            receiver,
            backend,
            config,
            cancel,
            adapters: BTreeMap::new(),
            states: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            poll_timer: None,
            event_publisher,
        }
    }

    /// Runs the actor loop until cancelled or every handle is dropped.
    ///
    /// The first discovery pass runs immediately.
    pub async fn run(mut self) {
        info!(
            discovery_secs = self.config.discovery_interval.as_secs(),
            poll_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            "Lifecycle actor starting"
        );

        let mut discovery = interval(self.config.discovery_interval);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.reconcile_poll_timer();

            // Timers before commands: a busy command queue must not hold
            // back discovery or polling.
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Lifecycle actor cancelled");
                    break;
                }

                _ = discovery.tick() => {
                    let report = self.discover().await;
                    if !report.is_quiet() {
                        info!(
                            added = report.added.len(),
                            removed = report.removed.len(),
                            started = report.started.len(),
                            stopped = report.stopped.len(),
                            failed = report.failed.len(),
                            "Adapter discovery changed state"
                        );
                    }
                }

                _ = next_poll(&mut self.poll_timer) => {
                    self.poll().await;
                }

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!("All lifecycle handles dropped");
                        break;
                    }
                },
            }
        }

        self.poll_timer = None;
        info!(
            adapters = self.adapters.len(),
            monitoring = self.monitoring_count(),
            "Lifecycle actor stopped"
        );
    }

    async fn handle_command(&mut self, cmd: LifecycleCommand) {
        match cmd {
            LifecycleCommand::Discover { respond_to } => {
                let report = self.discover().await;
                let _ = respond_to.send(report);
            }
            LifecycleCommand::StartMonitoring {
                adapter,
                respond_to,
            } => {
                let result = self.handle_start(adapter).await;
                let _ = respond_to.send(result);
            }
            LifecycleCommand::StopMonitoring {
                adapter,
                respond_to,
            } => {
                let state = self.handle_stop(adapter).await;
                let _ = respond_to.send(state);
            }
            LifecycleCommand::GetStates { respond_to } => {
                let _ = respond_to.send(self.states.clone());
            }
            LifecycleCommand::GetSnapshots { respond_to } => {
                let _ = respond_to.send(self.snapshots.clone());
            }
            LifecycleCommand::GetAdapters { respond_to } => {
                let _ = respond_to.send(self.adapters.values().cloned().collect());
            }
        }
    }

    // ========================================================================
    // Poll Timer
    // ========================================================================

    fn any_monitoring(&self) -> bool {
        self.states.values().any(MonitoringState::is_monitoring)
    }

    fn monitoring_count(&self) -> usize {
        self.states.values().filter(|s| s.is_monitoring()).count()
    }

    /// Creates or drops the poll timer to match the current state.
    fn reconcile_poll_timer(&mut self) {
        match (self.any_monitoring(), self.poll_timer.is_some()) {
            (true, false) => {
                let mut timer = interval(self.config.poll_interval);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.poll_timer = Some(timer);
                debug!("Poll timer started");
            }
            (false, true) => {
                self.poll_timer = None;
                debug!("Poll timer stopped, no adapter is monitored");
            }
            _ => {}
        }
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// One discovery pass: removals first, then per-adapter reconciliation.
    async fn discover(&mut self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        let listed = match self.backend.list_adapters().await {
            Ok(adapters) => adapters,
            Err(e) => {
                warn!(error = %e, "Failed to list adapters, keeping previous state");
                report.list_failed = true;
                return report;
            }
        };
        if self.cancel.is_cancelled() {
            debug!("Discarding adapter list received after cancellation");
            return report;
        }

        let current: BTreeMap<AdapterName, AdapterDescriptor> = listed
            .into_iter()
            .map(|a| (a.name.clone(), a))
            .collect();

        let removed: Vec<AdapterName> = self
            .adapters
            .keys()
            .filter(|name| !current.contains_key(*name))
            .cloned()
            .collect();

        for name in removed {
            let was_active = self.states.get(&name).is_some_and(MonitoringState::is_active);

            match self.backend.stop_monitoring(&name).await {
                Ok(()) => {
                    if was_active {
                        report.stopped.push(name.clone());
                    }
                }
                Err(e) => {
                    warn!(adapter = %name, error = %e, "Failed to stop monitoring removed adapter");
                }
            }
            if self.cancel.is_cancelled() {
                return report;
            }

            self.adapters.remove(&name);
            self.states.remove(&name);
            self.snapshots.remove(&name);
            info!(adapter = %name, "Adapter removed");
            self.publish(LifecycleEvent::AdapterRemoved {
                adapter: name.clone(),
            });
            report.removed.push(name);
        }

        for (name, adapter) in current {
            if !self.adapters.contains_key(&name) {
                info!(adapter = %name, is_up = adapter.is_up, "Adapter appeared");
                self.states.insert(name.clone(), MonitoringState::NotMonitoring);
                self.publish(LifecycleEvent::AdapterAppeared {
                    adapter: adapter.clone(),
                });
                report.added.push(name.clone());
            }
            let is_up = adapter.is_up;
            self.adapters.insert(name.clone(), adapter);

            if !is_up {
                if self.state_of(&name).is_active() {
                    debug!(adapter = %name, "Adapter went down");
                    report.stopped.push(name.clone());
                }
                self.set_state(&name, MonitoringState::NotMonitoring);
                continue;
            }

            let monitored = self.backend.is_adapter_monitoring(&name).await;
            if self.cancel.is_cancelled() {
                return report;
            }

            match monitored {
                Ok(true) => self.set_state(&name, MonitoringState::Monitoring),
                Ok(false) => match self.start_adapter(&name).await {
                    Ok(()) => report.started.push(name),
                    Err(_) if self.cancel.is_cancelled() => return report,
                    Err(_) => report.failed.push(name),
                },
                Err(e) => {
                    warn!(adapter = %name, error = %e, "Failed to query monitoring status");
                    self.set_state(&name, MonitoringState::NotMonitoring);
                    report.failed.push(name);
                }
            }
        }

        report
    }

    /// `NotMonitoring -> Starting -> Monitoring`, or back to `NotMonitoring`
    /// if the backend refuses.
    async fn start_adapter(&mut self, name: &AdapterName) -> Result<(), LifecycleError> {
        self.set_state(name, MonitoringState::Starting);

        let result = self.backend.start_monitoring(name).await;
        if self.cancel.is_cancelled() {
            debug!(adapter = %name, "Discarding start result received after cancellation");
            return Err(LifecycleError::ChannelClosed);
        }

        match result {
            Ok(()) => {
                info!(adapter = %name, "Monitoring started");
                self.set_state(name, MonitoringState::Monitoring);
                Ok(())
            }
            Err(e) => {
                warn!(adapter = %name, error = %e, "Failed to start monitoring");
                self.set_state(name, MonitoringState::NotMonitoring);
                Err(LifecycleError::StartFailed {
                    adapter: name.clone(),
                    source: e,
                })
            }
        }
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// Refreshes the snapshot of every monitored adapter.
    ///
    /// A failure leaves that adapter's previous snapshot in place.
    async fn poll(&mut self) {
        let monitored: Vec<AdapterName> = self
            .states
            .iter()
            .filter(|(_, state)| state.is_monitoring())
            .map(|(name, _)| name.clone())
            .collect();

        for name in monitored {
            let result = self.backend.get_live_stats(&name).await;

            if self.cancel.is_cancelled() {
                debug!("Discarding poll results received after cancellation");
                return;
            }
            if !self.state_of(&name).is_monitoring() {
                continue;
            }

            match result {
                Ok(snapshot) => {
                    self.snapshots.insert(name.clone(), snapshot.clone());
                    self.publish(LifecycleEvent::SnapshotUpdated {
                        adapter: name,
                        snapshot: Box::new(snapshot),
                    });
                }
                Err(e) => {
                    warn!(adapter = %name, error = %e, "Failed to poll live stats");
                }
            }
        }
    }

    // ========================================================================
    // Manual Control
    // ========================================================================

    async fn handle_start(&mut self, name: AdapterName) -> Result<MonitoringState, LifecycleError> {
        let Some(adapter) = self.adapters.get(&name) else {
            return Err(LifecycleError::UnknownAdapter(name));
        };
        if !adapter.is_up {
            return Err(LifecycleError::AdapterDown(name));
        }

        let current = self.state_of(&name);
        if current.is_active() {
            debug!(adapter = %name, state = %current, "Start requested for active adapter");
            return Ok(current);
        }

        self.start_adapter(&name).await?;
        Ok(self.state_of(&name))
    }

    /// Idempotent: a stopped or unknown adapter is left alone and no
    /// backend call is made. A failed backend stop is logged and the
    /// adapter is still marked stopped.
    async fn handle_stop(&mut self, name: AdapterName) -> MonitoringState {
        if !self.state_of(&name).is_active() {
            debug!(adapter = %name, "Stop requested for adapter that is not monitored");
            return MonitoringState::NotMonitoring;
        }

        if let Err(e) = self.backend.stop_monitoring(&name).await {
            warn!(adapter = %name, error = %e, "Failed to stop monitoring");
        } else {
            info!(adapter = %name, "Monitoring stopped");
        }

        if self.cancel.is_cancelled() {
            return self.state_of(&name);
        }
        self.set_state(&name, MonitoringState::NotMonitoring);
        MonitoringState::NotMonitoring
    }

    // ========================================================================
    // State Helpers
    // ========================================================================

    fn state_of(&self, name: &AdapterName) -> MonitoringState {
        self.states.get(name).copied().unwrap_or_default()
    }

    /// Writes a state for a known adapter and publishes a change event.
    fn set_state(&mut self, name: &AdapterName, state: MonitoringState) {
        if !self.adapters.contains_key(name) {
            return;
        }
        let previous = self.states.insert(name.clone(), state);
        if previous != Some(state) {
            debug!(adapter = %name, %state, "Monitoring state changed");
            self.publish(LifecycleEvent::StateChanged {
                adapter: name.clone(),
                state,
            });
        }
    }

    fn publish(&self, event: LifecycleEvent) {
        // No subscribers is normal.
        let _ = self.event_publisher.send(event);
    }
}

/// Resolves on the next poll tick, or never if no poll timer exists.
async fn next_poll(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
