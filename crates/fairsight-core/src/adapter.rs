//! Network adapter identity and monitoring state.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Stable identifier of a network adapter.
///
/// This is the name reported by the capture backend (e.g. `eth0`,
/// `\Device\NPF_{...}`, `utun3`). It is the join key for every
/// per-adapter map kept by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterName(String);

impl AdapterName {
    /// Creates a new adapter name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the name is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AdapterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<String> for AdapterName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AdapterName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AdapterName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Adapter Descriptor
// ============================================================================

/// A network interface the backend can capture traffic on.
///
/// Owned by the backend; the daemon only reads it to derive
/// monitoring decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    pub name: AdapterName,
    pub description: Option<String>,
    pub is_up: bool,
    pub is_loopback: bool,
    pub addresses: Vec<String>,
}

impl AdapterDescriptor {
    /// Creates a descriptor with no description and no addresses.
    pub fn new(name: impl Into<AdapterName>, is_up: bool) -> Self {
        Self {
            name: name.into(),
            description: None,
            is_up,
            is_loopback: false,
            addresses: Vec::new(),
        }
    }

    /// Returns the description, or the name when the backend gave none.
    pub fn label(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(self.name.as_str())
    }
}

// ============================================================================
// Monitoring State
// ============================================================================

/// Monitoring lifecycle of a single adapter.
///
/// ```text
/// NotMonitoring ──start──▶ Starting ──ok──▶ Monitoring
///       ▲                     │                 │
///       └────────failed───────┘◀──stop/down─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringState {
    #[default]
    NotMonitoring,
    Starting,
    Monitoring,
}

impl MonitoringState {
    /// Returns true if live stats should be polled for this adapter.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        matches!(self, Self::Monitoring)
    }

    /// Returns true if a backend session exists or is being created.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Monitoring)
    }

    /// Returns the display label for this state.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotMonitoring => "not monitoring",
            Self::Starting => "starting",
            Self::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for MonitoringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
