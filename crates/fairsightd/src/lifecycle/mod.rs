//! Adapter lifecycle management using the actor pattern.
//!
//! Tracks the live adapter set, keeps exactly one monitoring session per
//! up adapter, and polls live statistics while anything is monitored.
//!
//! ```text
//! ┌──────────────┐ LifecycleCommand ┌──────────────┐ LifecycleEvent ┌──────────────┐
//! │ Server / CLI │─────────────────▶│ MonitorActor │───────────────▶│  broadcast   │
//! └──────────────┘   (mpsc)         └──────┬───────┘                └──────────────┘
//!                                          │ discovery tick (always)
//!                                          │ poll tick (while any Monitoring)
//!                                          ▼
//!                                   ┌──────────────┐
//!                                   │   Backend    │
//!                                   └──────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;

mod actor;
mod commands;
mod handle;

pub use actor::{LifecycleConfig, MonitorActor};
pub use commands::{LifecycleCommand, LifecycleError, LifecycleEvent};
pub use handle::LifecycleHandle;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Spawns the lifecycle actor.
///
/// The actor runs its first discovery pass immediately and stops when
/// `cancel` fires; the returned `JoinHandle` completes once its timers are
/// gone.
pub fn spawn_monitor(
    backend: Arc<dyn Backend>,
    config: LifecycleConfig,
    cancel: CancellationToken,
) -> (LifecycleHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = MonitorActor::new(cmd_rx, backend, config, cancel, event_tx.clone());
    let task = tokio::spawn(actor.run());

    (LifecycleHandle::new(cmd_tx, event_tx), task)
}
