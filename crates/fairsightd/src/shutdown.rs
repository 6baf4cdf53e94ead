//! One-shot check of how the previous daemon run ended.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use fairsight_core::{Clock, ShutdownStatus};

use crate::backend::Backend;

/// Asks the backend once per process whether the last run shut down
/// uncleanly, and remembers the answer.
pub struct ShutdownDetector {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    status: OnceCell<ShutdownStatus>,
}

impl ShutdownDetector {
    pub fn new(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            status: OnceCell::new(),
        }
    }

    /// Performs the check on first call; later calls return the stored
    /// result without contacting the backend. A failed check counts as a
    /// clean shutdown.
    pub async fn check_previous_shutdown(&self) -> ShutdownStatus {
        *self
            .status
            .get_or_init(|| async {
                let now = self.clock.now();
                match self.backend.check_unexpected_shutdown().await {
                    Ok(true) => {
                        warn!("Previous run ended unexpectedly, lifetime counters are authoritative for today");
                        ShutdownStatus::unexpected(now)
                    }
                    Ok(false) => {
                        info!("Previous run shut down cleanly");
                        ShutdownStatus::clean(now)
                    }
                    Err(e) => {
                        warn!(error = %e, "Shutdown check failed, assuming clean shutdown");
                        ShutdownStatus::unknown(now)
                    }
                }
            })
            .await
    }

    /// The stored result, if the check has run.
    pub fn status(&self) -> Option<ShutdownStatus> {
        self.status.get().copied()
    }
}
