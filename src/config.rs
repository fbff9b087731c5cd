//! Client configuration.

use std::time::Duration;

use crate::ble::filter::DeviceFilter;
use crate::ble::uuids::HM10_NAME_MARKER;

/// Default length of a discovery window.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(10);

/// Configuration for an HM-10 client.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
    /// Substring an advertised name must contain (case-insensitive).
    pub name_marker: String,

    /// How long a scan runs before stopping on its own.
    pub scan_window: Duration,

    /// Whether toggle writes request a link-layer response.
    ///
    /// Off by default: toggles are fire-and-forget.
    pub write_with_response: bool,

    /// Capacity of the intent queue between handles and the core.
    pub intent_capacity: usize,

    /// Capacity of the session event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name_marker: HM10_NAME_MARKER.to_string(),
            scan_window: DEFAULT_SCAN_WINDOW,
            write_with_response: false,
            intent_capacity: 32,
            event_capacity: 64,
        }
    }
}

impl ClientConfig {
    /// Set the advertised-name marker.
    pub fn with_name_marker(mut self, marker: impl Into<String>) -> Self {
        self.name_marker = marker.into();
        self
    }

    /// Set the discovery window length.
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    /// Request link-layer responses for writes.
    pub fn with_write_response(mut self, with_response: bool) -> Self {
        self.write_with_response = with_response;
        self
    }

    /// Build the device filter for this configuration.
    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::new(&self.name_marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.name_marker, "HM-10");
        assert_eq!(config.scan_window, Duration::from_secs(10));
        assert!(!config.write_with_response);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::default()
            .with_name_marker("BT05")
            .with_scan_window(Duration::from_secs(3))
            .with_write_response(true);

        assert_eq!(config.device_filter().marker(), "bt05");
        assert_eq!(config.scan_window, Duration::from_secs(3));
        assert!(config.write_with_response);
    }
}
