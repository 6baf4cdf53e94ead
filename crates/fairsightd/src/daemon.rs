//! Daemon assembly: wires the backend, services, lifecycle actor and
//! server together and runs them until cancelled.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fairsight_core::{Clock, SystemClock};

use crate::activity::ActivityAggregator;
use crate::backend::{Backend, SocketBackend};
use crate::config::DaemonConfig;
use crate::history::TrafficHistory;
use crate::lifecycle::spawn_monitor;
use crate::server::{DaemonContext, DaemonServer, ServerError};
use crate::shutdown::ShutdownDetector;

/// Runs the daemon against the backend socket named in `config`.
pub async fn run_daemon(config: DaemonConfig, cancel: CancellationToken) -> Result<(), ServerError> {
    let backend: Arc<dyn Backend> = Arc::new(SocketBackend::new(
        config.backend_socket.clone(),
        config.backend_timeout(),
    ));
    run_with_backend(&config, backend, Arc::new(SystemClock), cancel).await
}

/// Runs the daemon with an explicit backend and clock.
///
/// The previous-shutdown check completes before the lifecycle actor starts
/// any monitoring. Returns once the server has stopped and the actor has
/// exited.
pub async fn run_with_backend(
    config: &DaemonConfig,
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let detector = ShutdownDetector::new(Arc::clone(&backend), Arc::clone(&clock));
    let shutdown = detector.check_previous_shutdown().await;

    let (lifecycle, monitor_task) =
        spawn_monitor(Arc::clone(&backend), config.lifecycle(), cancel.clone());
    info!(
        discovery_interval = ?config.lifecycle().discovery_interval,
        poll_interval = ?config.lifecycle().poll_interval,
        "Lifecycle actor started"
    );

    let context = DaemonContext {
        lifecycle,
        activity: ActivityAggregator::new(Arc::clone(&backend)),
        history: TrafficHistory::new(Arc::clone(&backend), Arc::clone(&clock)),
        shutdown,
        clock,
    };

    let server = DaemonServer::new(config.socket_path.clone(), context, cancel.clone());
    let result = server.run().await;

    // A server that failed to bind must not leave the actor running.
    cancel.cancel();
    if let Err(e) = monitor_task.await {
        warn!(error = %e, "Lifecycle actor task failed");
    }

    info!("Daemon stopped");
    result
}
