//! Observable session state consumed by the UI.
//!
//! The core owns every value here. Renderers receive immutable
//! [`SessionSnapshot`]s and never mutate them.

use chrono::{DateTime, Utc};

use crate::ble::advertisement::CandidatePeripheral;
use crate::ble::connection::SessionState;
use crate::ble::permissions::Permission;
use crate::ble::scanner::ScanState;

/// Connection status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LinkStatus {
    /// A link to the peripheral is up.
    Connected,
    /// No link.
    #[default]
    Disconnected,
}

impl LinkStatus {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// One line of the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogEntry {
    /// When the line was appended.
    pub at: DateTime<Utc>,
    /// Line text.
    pub text: String,
}

/// Append-only, ordered log of connection events and inbound messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageLog {
    entries: Vec<LogEntry>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line.
    pub fn push(&mut self, text: impl Into<String>) {
        self.entries.push(LogEntry {
            at: Utc::now(),
            text: text.into(),
        });
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Line texts in insertion order.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.text.clone()).collect()
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Immutable view of the core state handed to renderers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionSnapshot {
    /// Projected connection status.
    pub status: LinkStatus,
    /// Full session state.
    pub session_state: SessionState,
    /// Scanner state.
    pub scan_state: ScanState,
    /// Candidates from the current or last scan.
    pub candidates: Vec<CandidatePeripheral>,
    /// Message log lines.
    pub log: Vec<String>,
    /// Last toggle value written.
    pub toggled_on: bool,
    /// The session's peripheral, if any.
    pub peripheral: Option<CandidatePeripheral>,
}

/// Discrete notifications for the UI (prompts, errors, progress).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A discovery window opened.
    ScanStarted,
    /// The discovery window closed.
    ScanStopped,
    /// A new candidate was accepted.
    CandidateDiscovered(CandidatePeripheral),
    /// The platform reported a scan failure.
    ScanFailed {
        /// Platform-specific error code.
        code: i32,
    },
    /// Scanning was refused for lack of permissions.
    PermissionDenied(Vec<Permission>),
    /// The session reached the ready state.
    Ready {
        /// Peripheral address.
        address: String,
    },
    /// The link went down.
    Disconnected {
        /// Peripheral address.
        address: String,
    },
    /// A non-fatal error occurred.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "serde")]
    #[test]
    fn test_snapshot_is_serializable() {
        fn assert_serde<T: serde::Serialize + serde::de::DeserializeOwned>() {}
        assert_serde::<SessionSnapshot>();
        assert_serde::<MessageLog>();
    }

    #[test]
    fn test_link_status_display() {
        assert_eq!(LinkStatus::Connected.to_string(), "Connected");
        assert_eq!(LinkStatus::Disconnected.to_string(), "Disconnected");
        assert!(!LinkStatus::default().is_connected());
    }

    #[test]
    fn test_message_log_order_and_clear() {
        let mut log = MessageLog::new();
        log.push("one");
        log.push("two");
        assert_eq!(log.lines(), vec!["one", "two"]);
        assert_eq!(log.len(), 2);
        assert!(log.entries()[0].at <= log.entries()[1].at);

        log.clear();
        assert!(log.is_empty());
    }
}
