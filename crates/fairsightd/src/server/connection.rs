//! Connection handler for individual UI clients.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs protocol version negotiation
//! - Parses incoming messages
//! - Answers view-model queries from the daemon context
//! - Registers the client for lifecycle event pushes on request
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use fairsight_core::{AdapterName, DateRange};
use fairsight_protocol::{ClientMessage, DaemonMessage, MessageType, ProtocolVersion};

use super::{DaemonContext, MAX_SUBSCRIBERS};
use crate::lifecycle::LifecycleError;

/// Shared writer handle, also used by the event forwarder.
pub type SubscriberWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Subscribed clients keyed by client_id.
pub type SubscribersMap = Arc<RwLock<HashMap<String, SubscriberWriter>>>;

/// Maximum message size (1 MiB)
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type ClientId = String;

/// Connection handler for a single client.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,

    /// Buffered writer, shared with the event forwarder once subscribed
    writer: SubscriberWriter,

    context: DaemonContext,

    subscribers: SubscribersMap,

    /// Assigned during the handshake
    client_id: Option<ClientId>,

    subscribed: bool,

    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        context: DaemonContext,
        subscribers: SubscribersMap,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            context,
            subscribers,
            client_id: None,
            subscribed: false,
            connection_number,
        }
    }

    /// Performs the handshake, then serves requests until the client
    /// disconnects. Returns the client id so the server can drop its
    /// subscription.
    pub async fn run(mut self) -> Option<ClientId> {
        debug!(connection = self.connection_number, "New client connected");

        match timeout(READ_TIMEOUT, self.handle_handshake()).await {
            Ok(Ok(())) => {
                info!(client_id = ?self.client_id, "Client handshake completed");
            }
            Ok(Err(e)) => {
                warn!(connection = self.connection_number, error = %e, "Handshake failed");
                return None;
            }
            Err(_) => {
                warn!(connection = self.connection_number, "Handshake timed out");
                return None;
            }
        }

        let client_id = self.client_id.clone();

        if let Err(e) = self.process_messages().await {
            debug!(client_id = ?self.client_id, error = %e, "Connection closed");
        }

        info!(client_id = ?self.client_id, "Client disconnected");
        client_id
    }

    /// Expects a `Connect` message with a compatible protocol version and
    /// answers `Connected` or `Rejected`.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let msg = self.read_message().await?;

        let client_version = msg.protocol_version;
        if let Err(e) = ProtocolVersion::CURRENT.negotiate(&client_version) {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );
            self.send_message(DaemonMessage::rejected(&e.to_string()))
                .await?;
            return Err(ConnectionError::VersionMismatch {
                client: client_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect { client_id } => {
                let assigned_id =
                    client_id.unwrap_or_else(|| format!("client-{}", self.connection_number));
                self.client_id = Some(assigned_id.clone());
                self.send_message(DaemonMessage::connected(assigned_id))
                    .await
            }
            other => {
                self.send_message(DaemonMessage::error("Expected Connect message for handshake"))
                    .await?;
                Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
            }
        }
    }

    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(client_id = ?self.client_id, "Client sent EOF");
                    return Ok(());
                }
                Ok(Err(ConnectionError::ParseError(e))) => {
                    // A malformed line does not end the session.
                    debug!(client_id = ?self.client_id, error = %e, "Unparseable message");
                    self.send_message(DaemonMessage::error_with_code(
                        &format!("Parse error: {e}"),
                        "parse_error",
                    ))
                    .await?;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(client_id = ?self.client_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            match self.handle_message(msg).await {
                Ok(()) => {}
                Err(ConnectionError::Eof) => return Ok(()),
                Err(e) => {
                    error!(client_id = ?self.client_id, error = %e, "Error handling message");
                    let _ = self
                        .send_message(DaemonMessage::error(&e.to_string()))
                        .await;
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), ConnectionError> {
        let reply = match msg.message {
            MessageType::Connect { .. } => DaemonMessage::error("Already connected"),

            MessageType::GetActivity { start, end } => self.activity(start, end).await,

            MessageType::GetTrafficHistory { start, end } => {
                self.traffic_history(start, end).await
            }

            MessageType::GetAdapters => DaemonMessage::Adapters {
                adapters: self.context.lifecycle.adapters().await?,
            },

            MessageType::GetMonitoringStates => DaemonMessage::MonitoringStates {
                states: self.context.lifecycle.monitoring_states().await?,
            },

            MessageType::GetLiveSnapshots => DaemonMessage::LiveSnapshots {
                snapshots: self.context.lifecycle.live_snapshots().await?,
            },

            MessageType::GetShutdownStatus => DaemonMessage::ShutdownStatus {
                status: self.context.shutdown,
            },

            MessageType::GetCurrentTotals => match self.context.history.current_totals().await {
                Ok(comparison) => DaemonMessage::CurrentTotals { comparison },
                Err(e) => DaemonMessage::error_with_code(&e.to_string(), "totals_unavailable"),
            },

            MessageType::StartMonitoring { adapter } => self.start_monitoring(adapter).await?,

            MessageType::StopMonitoring { adapter } => {
                let state = self
                    .context
                    .lifecycle
                    .stop_monitoring(adapter.clone())
                    .await?;
                DaemonMessage::MonitoringChanged { adapter, state }
            }

            MessageType::Discover => {
                debug!(client_id = ?self.client_id, "Client requested discovery");
                DaemonMessage::DiscoveryComplete {
                    report: self.context.lifecycle.discover().await?,
                }
            }

            MessageType::Subscribe => self.subscribe().await?,

            MessageType::Unsubscribe => {
                if let Some(ref client_id) = self.client_id {
                    self.subscribers.write().await.remove(client_id);
                }
                self.subscribed = false;
                debug!(client_id = ?self.client_id, "Client unsubscribed from events");
                return Ok(());
            }

            MessageType::Ping { seq } => DaemonMessage::Pong { seq },

            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client requested disconnect");
                return Err(ConnectionError::Eof);
            }
        };

        self.send_message(reply).await
    }

    async fn activity(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> DaemonMessage {
        let range = match DateRange::resolve(start, end, self.context.clock.today()) {
            Ok(range) => range,
            Err(e) => return DaemonMessage::error_with_code(&e.to_string(), "invalid_range"),
        };
        match self.context.activity.aggregate(range).await {
            Ok(days) => DaemonMessage::ActivitySeries { days },
            Err(e) => DaemonMessage::error_with_code(&e.to_string(), "invalid_data"),
        }
    }

    async fn traffic_history(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> DaemonMessage {
        let range = match DateRange::resolve(start, end, self.context.clock.today()) {
            Ok(range) => range,
            Err(e) => return DaemonMessage::error_with_code(&e.to_string(), "invalid_range"),
        };
        match self.context.history.fetch(range).await {
            Ok(view) => DaemonMessage::TrafficHistory {
                days: view.days,
                stats: view.stats,
            },
            Err(e) => DaemonMessage::HistoryUnavailable {
                message: e.to_string(),
            },
        }
    }

    /// Request-level refusals become coded error replies; a closed actor
    /// is a connection error.
    async fn start_monitoring(
        &self,
        adapter: AdapterName,
    ) -> Result<DaemonMessage, ConnectionError> {
        match self.context.lifecycle.start_monitoring(adapter.clone()).await {
            Ok(state) => Ok(DaemonMessage::MonitoringChanged { adapter, state }),
            Err(LifecycleError::ChannelClosed) => {
                Err(ConnectionError::Lifecycle(LifecycleError::ChannelClosed))
            }
            Err(e) => Ok(DaemonMessage::error_with_code(
                &e.to_string(),
                lifecycle_error_code(&e),
            )),
        }
    }

    /// Registers this client for event pushes and replies with the current
    /// monitoring states as the initial view.
    async fn subscribe(&mut self) -> Result<DaemonMessage, ConnectionError> {
        let Some(client_id) = self.client_id.clone() else {
            return Ok(DaemonMessage::error("Must connect before subscribing"));
        };

        {
            let mut subs = self.subscribers.write().await;
            if subs.len() >= MAX_SUBSCRIBERS && !subs.contains_key(&client_id) {
                return Ok(DaemonMessage::error_with_code(
                    &format!("Too many subscribers (max: {MAX_SUBSCRIBERS})"),
                    "too_many_subscribers",
                ));
            }
            subs.insert(client_id.clone(), Arc::clone(&self.writer));
        }

        self.subscribed = true;
        debug!(client_id = %client_id, "Client subscribed to events");

        Ok(DaemonMessage::MonitoringStates {
            states: self.context.lifecycle.monitoring_states().await?,
        })
    }

    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage = serde_json::from_str(&line)
            .map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = ?std::mem::discriminant(&msg.message),
            "Received message"
        );

        Ok(msg)
    }

    async fn send_message(&self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        let json =
            serde_json::to_string(&msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        let mut writer = self.writer.lock().await;

        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}

fn lifecycle_error_code(err: &LifecycleError) -> &'static str {
    match err {
        LifecycleError::UnknownAdapter(_) => "unknown_adapter",
        LifecycleError::AdapterDown(_) => "adapter_down",
        LifecycleError::StartFailed { .. } => "start_failed",
        LifecycleError::ChannelClosed => "unavailable",
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}
