//! Outcome of the previous-shutdown check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether the previous daemon run ended without its normal teardown.
///
/// Purely advisory. An unclean shutdown means today's persisted sessions
/// may be missing data, so lifetime counters are the trustworthy total; it
/// never causes counters to be reset or discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownStatus {
    pub unexpected: bool,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
    /// The check itself failed and `unexpected` is the fallback value.
    #[serde(default)]
    pub check_failed: bool,
}

impl ShutdownStatus {
    pub fn clean(checked_at: DateTime<Utc>) -> Self {
        Self {
            unexpected: false,
            checked_at,
            check_failed: false,
        }
    }

    pub fn unexpected(checked_at: DateTime<Utc>) -> Self {
        Self {
            unexpected: true,
            checked_at,
            check_failed: false,
        }
    }

    /// Result used when the backend could not answer.
    pub fn unknown(checked_at: DateTime<Utc>) -> Self {
        Self {
            unexpected: false,
            checked_at,
            check_failed: true,
        }
    }

    /// Message to show the user, if any.
    pub fn advisory(&self) -> Option<&'static str> {
        if self.unexpected {
            Some("The previous session ended unexpectedly. Today's totals are taken from lifetime counters.")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_only_when_unexpected() {
        let now = Utc::now();
        assert!(ShutdownStatus::clean(now).advisory().is_none());
        assert!(ShutdownStatus::unknown(now).advisory().is_none());
        assert!(ShutdownStatus::unexpected(now).advisory().is_some());
    }
}
