//! Fairsight Daemon - Adapter lifecycle, history reconciliation and the UI server
//!
//! This crate provides the daemon's moving parts:
//! - `backend` - Client for the capture backend
//! - `lifecycle` - Actor that discovers adapters and keeps them monitored
//! - `activity` - Daily activity series built from interval logs
//! - `history` - Traffic history reconciled with live counters
//! - `shutdown` - One-shot check of how the previous run ended
//! - `server` - Unix socket server for UI clients
//! - `client` - Client side of the UI protocol
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       fairsightd                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────┐      ┌──────────────────────────────┐   │
//! │  │  DaemonServer   │─────▶│ MonitorActor                 │   │
//! │  │ (Unix Socket)   │      │ (adapter state owner)        │   │
//! │  └────────┬────────┘      └──────────────┬───────────────┘   │
//! │           │                              │                   │
//! │           │ queries                      │ backend calls     │
//! │           ▼                              ▼                   │
//! │  ┌─────────────────┐      ┌──────────────────────────────┐   │
//! │  │ Activity /      │─────▶│ Backend (socket)             │   │
//! │  │ TrafficHistory  │      │                              │   │
//! │  └─────────────────┘      └──────────────────────────────┘   │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod activity;
pub mod backend;
pub mod client;
pub mod config;
pub mod daemon;
pub mod history;
pub mod lifecycle;
pub mod server;
pub mod shutdown;

pub use config::DaemonConfig;
pub use daemon::{run_daemon, run_with_backend};
