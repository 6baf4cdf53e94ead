//! Backend client over a Unix socket.
//!
//! One connection per request: write a single JSON line, read a single JSON
//! line back. The whole exchange is bounded by the configured timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use fairsight_core::{
    AdapterDescriptor, AdapterName, CurrentTotals, LifetimeCounters, LiveTrafficSnapshot,
    PersistedDaySession,
};
use fairsight_protocol::backend::{
    decode, decode_adapters, decode_lifetime_counters, decode_log, decode_log_batch,
    decode_session_history, RawCurrentTotals, RawLiveStats,
};
use fairsight_protocol::{BackendReply, BackendRequest};

use super::{Backend, BackendError, BackendResult};

/// Largest reply accepted from the backend (16 MiB).
pub const MAX_REPLY_SIZE: u64 = 16 * 1024 * 1024;

/// [`Backend`] implementation speaking JSON lines over a Unix socket.
#[derive(Debug, Clone)]
pub struct SocketBackend {
    socket_path: PathBuf,
    timeout: Duration,
}

impl SocketBackend {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends one request and returns the reply's `data` payload.
    async fn call(&self, request: BackendRequest) -> BackendResult<serde_json::Value> {
        let command = request.name();

        let reply = match timeout(self.timeout, self.exchange(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(command, "Backend call timed out");
                return Err(BackendError::Timeout {
                    command,
                    after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        match reply {
            BackendReply::Ok { data } => {
                debug!(command, "Backend call succeeded");
                Ok(data)
            }
            BackendReply::Error { message } => Err(BackendError::Rejected { command, message }),
        }
    }

    async fn exchange(&self, request: &BackendRequest) -> BackendResult<BackendReply> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| BackendError::Unavailable(format!("{}: {e}", self.socket_path.display())))?;
        let (reader, mut writer) = stream.into_split();

        let json =
            serde_json::to_string(request).map_err(|e| BackendError::Protocol(e.to_string()))?;
        let io_err = |e: std::io::Error| BackendError::Unavailable(e.to_string());
        writer.write_all(json.as_bytes()).await.map_err(io_err)?;
        writer.write_all(b"\n").await.map_err(io_err)?;
        writer.flush().await.map_err(io_err)?;

        let mut reader = BufReader::new(reader.take(MAX_REPLY_SIZE));
        let mut line = String::new();
        let read = reader.read_line(&mut line).await.map_err(io_err)?;
        if read == 0 {
            return Err(BackendError::Unavailable(
                "connection closed before reply".to_string(),
            ));
        }

        serde_json::from_str(line.trim()).map_err(|e| BackendError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl Backend for SocketBackend {
    async fn list_adapters(&self) -> BackendResult<Vec<AdapterDescriptor>> {
        let data = self.call(BackendRequest::ListAdapters).await?;
        let (adapters, rejected) = decode_adapters(data)?;
        for err in rejected {
            warn!(error = %err, "Ignoring invalid adapter from backend");
        }
        Ok(adapters)
    }

    async fn is_adapter_monitoring(&self, adapter: &AdapterName) -> BackendResult<bool> {
        let data = self
            .call(BackendRequest::IsAdapterMonitoring {
                adapter: adapter.clone(),
            })
            .await?;
        Ok(decode("monitoring flag", "a boolean", data)?)
    }

    async fn start_monitoring(&self, adapter: &AdapterName) -> BackendResult<()> {
        self.call(BackendRequest::StartMonitoring {
            adapter: adapter.clone(),
        })
        .await
        .map(|_| ())
    }

    async fn stop_monitoring(&self, adapter: &AdapterName) -> BackendResult<()> {
        self.call(BackendRequest::StopMonitoring {
            adapter: adapter.clone(),
        })
        .await
        .map(|_| ())
    }

    async fn get_live_stats(&self, adapter: &AdapterName) -> BackendResult<LiveTrafficSnapshot> {
        let data = self
            .call(BackendRequest::GetLiveStats {
                adapter: adapter.clone(),
            })
            .await?;
        let raw: RawLiveStats = decode("live stats", "a monitoring stats object", data)?;
        Ok(raw.into_snapshot(Utc::now()))
    }

    async fn get_lifetime_counters(&self) -> BackendResult<Vec<LifetimeCounters>> {
        let data = self.call(BackendRequest::GetLifetimeCounters).await?;
        Ok(decode_lifetime_counters(data)?)
    }

    async fn get_session_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BackendResult<Vec<PersistedDaySession>> {
        let data = self
            .call(BackendRequest::GetSessionHistory { start, end })
            .await?;
        Ok(decode_session_history(data)?)
    }

    async fn get_current_totals(&self) -> BackendResult<CurrentTotals> {
        let data = self.call(BackendRequest::GetCurrentTotals).await?;
        let raw: RawCurrentTotals = decode("current totals", "an object with combined_totals", data)?;
        Ok(raw.into())
    }

    async fn check_unexpected_shutdown(&self) -> BackendResult<bool> {
        let data = self.call(BackendRequest::CheckUnexpectedShutdown).await?;
        Ok(decode("shutdown flag", "a boolean", data)?)
    }

    async fn get_daily_summary_log(&self, date: NaiveDate) -> BackendResult<Option<String>> {
        let data = self
            .call(BackendRequest::GetDailySummaryLog { date })
            .await?;
        Ok(decode_log(data)?)
    }

    async fn aggregate_activity_logs(
        &self,
        dates: &[NaiveDate],
    ) -> BackendResult<Vec<Option<String>>> {
        let data = self
            .call(BackendRequest::AggregateActivityLogs {
                dates: dates.to_vec(),
            })
            .await?;
        Ok(decode_log_batch(data)?)
    }
}
