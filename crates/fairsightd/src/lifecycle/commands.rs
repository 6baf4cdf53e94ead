//! Lifecycle actor commands, errors, and events.
//!
//! - `LifecycleCommand`: requests sent to the actor
//! - `LifecycleError`: failures a request can report
//! - `LifecycleEvent`: changes published to subscribers

use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::oneshot;

use fairsight_core::{AdapterDescriptor, AdapterName, LiveTrafficSnapshot, MonitoringState};
use fairsight_protocol::DiscoveryReport;

use crate::backend::BackendError;

// ============================================================================
// Lifecycle Commands
// ============================================================================

/// Commands sent to the lifecycle actor.
///
/// Each request carries a oneshot channel for its reply. Timer ticks are not
/// commands; the actor drives its own discovery and poll timers.
#[derive(Debug)]
pub enum LifecycleCommand {
    /// Run a discovery pass now instead of waiting for the next tick.
    Discover {
        respond_to: oneshot::Sender<DiscoveryReport>,
    },

    /// Start monitoring an adapter by request.
    ///
    /// # Errors
    /// - `LifecycleError::UnknownAdapter` if discovery has not seen it
    /// - `LifecycleError::AdapterDown` if the adapter is down
    /// - `LifecycleError::StartFailed` if the backend refused
    StartMonitoring {
        adapter: AdapterName,
        respond_to: oneshot::Sender<Result<MonitoringState, LifecycleError>>,
    },

    /// Stop monitoring an adapter. Stopping a stopped or unknown adapter is
    /// a no-op that still reports `NotMonitoring`.
    StopMonitoring {
        adapter: AdapterName,
        respond_to: oneshot::Sender<MonitoringState>,
    },

    GetStates {
        respond_to: oneshot::Sender<BTreeMap<AdapterName, MonitoringState>>,
    },

    GetSnapshots {
        respond_to: oneshot::Sender<BTreeMap<AdapterName, LiveTrafficSnapshot>>,
    },

    GetAdapters {
        respond_to: oneshot::Sender<Vec<AdapterDescriptor>>,
    },
}

// ============================================================================
// Lifecycle Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("unknown adapter: {0}")]
    UnknownAdapter(AdapterName),

    #[error("adapter is down: {0}")]
    AdapterDown(AdapterName),

    #[error("failed to start monitoring {adapter}: {source}")]
    StartFailed {
        adapter: AdapterName,
        #[source]
        source: BackendError,
    },

    /// The actor has shut down.
    #[error("lifecycle channel closed")]
    ChannelClosed,
}

// ============================================================================
// Lifecycle Events
// ============================================================================

/// Changes published by the actor on its broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Discovery saw an adapter for the first time.
    AdapterAppeared { adapter: AdapterDescriptor },

    /// An adapter vanished from the backend's list (e.g. VPN disconnect).
    AdapterRemoved { adapter: AdapterName },

    /// An adapter's monitoring state changed.
    StateChanged {
        adapter: AdapterName,
        state: MonitoringState,
    },

    /// A poll stored a fresh snapshot.
    SnapshotUpdated {
        adapter: AdapterName,
        snapshot: Box<LiveTrafficSnapshot>,
    },
}

impl LifecycleEvent {
    /// The adapter this event concerns.
    pub fn adapter(&self) -> &AdapterName {
        match self {
            Self::AdapterAppeared { adapter } => &adapter.name,
            Self::AdapterRemoved { adapter }
            | Self::StateChanged { adapter, .. }
            | Self::SnapshotUpdated { adapter, .. } => adapter,
        }
    }
}
