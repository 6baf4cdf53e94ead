//! Client interface for the lifecycle actor.

use std::collections::BTreeMap;

use tokio::sync::{broadcast, mpsc, oneshot};

use fairsight_core::{AdapterDescriptor, AdapterName, LiveTrafficSnapshot, MonitoringState};
use fairsight_protocol::DiscoveryReport;

use super::commands::{LifecycleCommand, LifecycleError, LifecycleEvent};

// ============================================================================
// Lifecycle Handle
// ============================================================================

/// Cheap-to-clone handle for talking to the lifecycle actor.
///
/// Every method fails with `LifecycleError::ChannelClosed` once the actor
/// has stopped.
#[derive(Clone)]
pub struct LifecycleHandle {
    sender: mpsc::Sender<LifecycleCommand>,
    event_sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleHandle {
    pub fn new(
        sender: mpsc::Sender<LifecycleCommand>,
        event_sender: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Runs a discovery pass immediately and returns what it changed.
    pub async fn discover(&self) -> Result<DiscoveryReport, LifecycleError> {
        let (tx, rx) = oneshot::channel();
        self.send(LifecycleCommand::Discover { respond_to: tx }).await?;
        rx.await.map_err(|_| LifecycleError::ChannelClosed)
    }

    /// Starts monitoring a known, up adapter. Already-active adapters are
    /// reported as they are.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::UnknownAdapter` if discovery has not seen it
    /// - `LifecycleError::AdapterDown` if the adapter is down
    /// - `LifecycleError::StartFailed` if the backend refused
    /// - `LifecycleError::ChannelClosed` if the actor has shut down
    pub async fn start_monitoring(
        &self,
        adapter: AdapterName,
    ) -> Result<MonitoringState, LifecycleError> {
        let (tx, rx) = oneshot::channel();
        self.send(LifecycleCommand::StartMonitoring {
            adapter,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| LifecycleError::ChannelClosed)?
    }

    /// Stops monitoring an adapter. Safe to call repeatedly.
    pub async fn stop_monitoring(
        &self,
        adapter: AdapterName,
    ) -> Result<MonitoringState, LifecycleError> {
        let (tx, rx) = oneshot::channel();
        self.send(LifecycleCommand::StopMonitoring {
            adapter,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| LifecycleError::ChannelClosed)
    }

    pub async fn monitoring_states(
        &self,
    ) -> Result<BTreeMap<AdapterName, MonitoringState>, LifecycleError> {
        let (tx, rx) = oneshot::channel();
        self.send(LifecycleCommand::GetStates { respond_to: tx })
            .await?;
        rx.await.map_err(|_| LifecycleError::ChannelClosed)
    }

    pub async fn live_snapshots(
        &self,
    ) -> Result<BTreeMap<AdapterName, LiveTrafficSnapshot>, LifecycleError> {
        let (tx, rx) = oneshot::channel();
        self.send(LifecycleCommand::GetSnapshots { respond_to: tx })
            .await?;
        rx.await.map_err(|_| LifecycleError::ChannelClosed)
    }

    pub async fn adapters(&self) -> Result<Vec<AdapterDescriptor>, LifecycleError> {
        let (tx, rx) = oneshot::channel();
        self.send(LifecycleCommand::GetAdapters { respond_to: tx })
            .await?;
        rx.await.map_err(|_| LifecycleError::ChannelClosed)
    }

    /// Subscribes to lifecycle events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_sender.subscribe()
    }

    async fn send(&self, cmd: LifecycleCommand) -> Result<(), LifecycleError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| LifecycleError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (LifecycleHandle, mpsc::Receiver<LifecycleCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        (LifecycleHandle::new(cmd_tx, event_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_start_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let responder = tokio::spawn(async move {
            if let Some(LifecycleCommand::StartMonitoring {
                adapter,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(adapter.as_str(), "eth0");
                let _ = respond_to.send(Ok(MonitoringState::Monitoring));
                return true;
            }
            false
        });

        let state = handle.start_monitoring(AdapterName::new("eth0")).await;
        assert_eq!(state, Ok(MonitoringState::Monitoring));
        assert!(responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert_eq!(handle.discover().await, Err(LifecycleError::ChannelClosed));
        assert_eq!(
            handle.stop_monitoring(AdapterName::new("eth0")).await,
            Err(LifecycleError::ChannelClosed)
        );
    }

    #[tokio::test]
    async fn test_dropped_responder_is_channel_closed() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop without answering.
            let _ = rx.recv().await;
        });

        assert_eq!(
            handle.monitoring_states().await,
            Err(LifecycleError::ChannelClosed)
        );
    }
}
