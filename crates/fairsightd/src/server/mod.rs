//! Unix socket server exposing the daemon's view-models.
//!
//! The server:
//! - Listens on a Unix socket for UI clients
//! - Spawns a ConnectionHandler for each client
//! - Forwards lifecycle events to subscribed clients
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌──────────────────────────────┐
//! │ConnectionHandler│────▶│ DaemonContext                │
//! │   (per client)  │     │  lifecycle / activity /      │
//! └─────────────────┘     │  history / shutdown status   │
//!         ▲               └──────────────┬───────────────┘
//!         │ broadcast                    │ LifecycleEvent
//! ┌───────┴─────────┐                    │
//! │ event forwarder │◀───────────────────┘
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, SubscriberWriter, SubscribersMap};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fairsight_core::{Clock, ShutdownStatus};
use fairsight_protocol::DaemonMessage;

use crate::activity::ActivityAggregator;
use crate::history::TrafficHistory;
use crate::lifecycle::{LifecycleEvent, LifecycleHandle};

/// Maximum number of concurrently subscribed UI clients.
pub const MAX_SUBSCRIBERS: usize = 10;

/// Everything a connection needs to answer requests.
#[derive(Clone)]
pub struct DaemonContext {
    pub lifecycle: LifecycleHandle,
    pub activity: ActivityAggregator,
    pub history: TrafficHistory,
    /// Result of the startup shutdown check.
    pub shutdown: ShutdownStatus,
    pub clock: Arc<dyn Clock>,
}

/// Unix socket server for UI clients.
pub struct DaemonServer {
    socket_path: PathBuf,
    context: DaemonContext,
    cancel_token: CancellationToken,

    /// Connection counter for generating client IDs
    connection_counter: AtomicU64,

    /// Subscribed clients keyed by client_id
    subscribers: SubscribersMap,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        context: DaemonContext,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            context,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Binds the socket and serves clients until the cancellation token
    /// fires. The socket file is removed on the way out.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;

        info!(socket = %self.socket_path.display(), "Daemon server listening");

        self.spawn_event_forwarder();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    fn bind(&self) -> Result<UnixListener, ServerError> {
        let setup_error = |e: std::io::Error| ServerError::SocketSetup {
            path: self.socket_path.clone(),
            error: e.to_string(),
        };

        // A stale socket from a previous run blocks bind().
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(setup_error)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(setup_error)?;
            }
        }

        UnixListener::bind(&self.socket_path).map_err(setup_error)
    }

    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let context = self.context.clone();
        let subscribers = Arc::clone(&self.subscribers);

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(
                reader,
                writer,
                context,
                Arc::clone(&subscribers),
                connection_number,
            );

            let client_id = handler.run().await;

            if let Some(id) = client_id {
                let mut subs = subscribers.write().await;
                if subs.remove(&id).is_some() {
                    debug!(client_id = %id, "Removed disconnected subscriber");
                }
            }
        });
    }

    /// Forwards lifecycle events to every subscribed client.
    fn spawn_event_forwarder(&self) {
        let mut event_rx = self.context.lifecycle.subscribe();
        let subscribers = Arc::clone(&self.subscribers);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event forwarder shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => {
                                broadcast_event(&subscribers, &event).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event forwarder lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Lifecycle event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    async fn cleanup(&self) {
        self.subscribers.write().await.clear();

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// The push message sent to subscribers for a lifecycle event.
pub fn event_message(event: &LifecycleEvent) -> DaemonMessage {
    match event {
        LifecycleEvent::AdapterAppeared { adapter } => DaemonMessage::AdapterAppeared {
            adapter: adapter.clone(),
        },
        LifecycleEvent::AdapterRemoved { adapter } => DaemonMessage::AdapterRemoved {
            adapter: adapter.clone(),
        },
        LifecycleEvent::StateChanged { adapter, state } => DaemonMessage::AdapterStateChanged {
            adapter: adapter.clone(),
            state: *state,
        },
        LifecycleEvent::SnapshotUpdated { adapter, snapshot } => DaemonMessage::SnapshotUpdated {
            adapter: adapter.clone(),
            snapshot: snapshot.clone(),
        },
    }
}

async fn broadcast_event(subscribers: &SubscribersMap, event: &LifecycleEvent) {
    let json = match serde_json::to_string(&event_message(event)) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "Failed to serialize event");
            return;
        }
    };

    let subs = subscribers.read().await;
    let mut failed_clients = Vec::new();

    for (client_id, writer) in subs.iter() {
        let mut writer = writer.lock().await;
        let send_result = async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = send_result {
            debug!(client_id = %client_id, error = %e, "Failed to send event to subscriber");
            failed_clients.push(client_id.clone());
        }
    }

    drop(subs);

    if !failed_clients.is_empty() {
        let mut subs = subscribers.write().await;
        for client_id in failed_clients {
            subs.remove(&client_id);
            debug!(client_id = %client_id, "Removed failed subscriber");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
