//! Client side of the UI socket protocol.
//!
//! Used by the command-line client and by the integration tests. One
//! `DaemonClient` is one connection: it performs the handshake on connect,
//! then sends requests and reads replies line by line. Pushed events that
//! arrive while a reply is awaited are queued and handed out by
//! [`DaemonClient::next_event`].
//!
//! **Panic-Free Policy:** no `.unwrap()`, `.expect()`, `panic!()`.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::debug;

use fairsight_protocol::{ClientMessage, DaemonMessage, MessageType, ProtocolVersion};

/// Default time to wait for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    /// The daemon socket could not be reached. Usually the daemon is not
    /// running.
    #[error("Failed to connect to daemon at {path}: {reason}")]
    Connect { path: String, reason: String },

    #[error("Protocol version mismatch (client: {client_version}, daemon: {daemon_version}): {reason}")]
    VersionMismatch {
        client_version: String,
        daemon_version: String,
        reason: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Daemon closed the connection")]
    Disconnected,

    #[error("Timed out waiting for the daemon")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A handshaken connection to the daemon.
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    client_id: String,
    reply_timeout: Duration,
    pending_events: VecDeque<DaemonMessage>,
}

impl DaemonClient {
    /// Connects to `socket_path` and performs the protocol handshake.
    pub async fn connect(socket_path: &Path, client_id: Option<String>) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| ClientError::Connect {
                path: socket_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let (reader, writer) = stream.into_split();

        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
            client_id: String::new(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            pending_events: VecDeque::new(),
        };

        client.send(&ClientMessage::connect(client_id)).await?;
        match client.read_reply().await? {
            DaemonMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(ClientError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                        reason: "incompatible major version".to_string(),
                    });
                }
                debug!(client_id = %client_id, protocol_version = %protocol_version, "Handshake complete");
                client.client_id = client_id;
                Ok(client)
            }
            DaemonMessage::Rejected {
                reason,
                protocol_version,
            } => Err(ClientError::VersionMismatch {
                client_version: ProtocolVersion::CURRENT.to_string(),
                daemon_version: protocol_version.to_string(),
                reason,
            }),
            other => Err(ClientError::Protocol(format!(
                "Unexpected response to connect: {other:?}"
            ))),
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// The id the daemon assigned during the handshake.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Sends a request and waits for its reply.
    pub async fn request(&mut self, message: MessageType) -> Result<DaemonMessage, ClientError> {
        self.send(&ClientMessage::new(message)).await?;
        self.read_reply().await
    }

    /// Subscribes to lifecycle events. The reply carries the current
    /// monitoring states.
    pub async fn subscribe(&mut self) -> Result<DaemonMessage, ClientError> {
        self.request(MessageType::Subscribe).await
    }

    /// Waits for the next pushed event, with no timeout.
    pub async fn next_event(&mut self) -> Result<DaemonMessage, ClientError> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(event);
        }
        loop {
            let msg = self.read_message().await?;
            if msg.is_event() {
                return Ok(msg);
            }
            debug!(message = ?msg, "Ignoring non-event message while watching");
        }
    }

    /// Tells the daemon this client is leaving.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::new(MessageType::Disconnect)).await
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        debug!(message_type = ?message.message, "Sent message to daemon");
        Ok(())
    }

    /// Reads until a non-event message arrives, queueing events seen on
    /// the way.
    async fn read_reply(&mut self) -> Result<DaemonMessage, ClientError> {
        let reply_timeout = self.reply_timeout;
        timeout(reply_timeout, async {
            loop {
                let msg = self.read_message().await?;
                if msg.is_event() {
                    self.pending_events.push_back(msg);
                } else {
                    return Ok(msg);
                }
            }
        })
        .await
        .map_err(|_| ClientError::Timeout)?
    }

    async fn read_message(&mut self) -> Result<DaemonMessage, ClientError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }
        Ok(serde_json::from_str(line.trim())?)
    }
}
