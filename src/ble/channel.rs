//! Message channel over the HM-10 serial characteristic.
//!
//! Outbound traffic is a single ASCII byte per toggle. Inbound notifications
//! are UTF-8 text frames.

use tracing::{trace, warn};

use crate::ble::backend::{BleBackend, CharacteristicRef};
use crate::ble::uuids::{HM10_CHARACTERISTIC_UUID, HM10_SERVICE_UUID};
use crate::error::Result;

/// Boolean user intent sent to the module.
///
/// `On` is written as `"U"`, `Off` as `"L"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ToggleCommand {
    /// Switch on.
    On,
    /// Switch off.
    Off,
}

impl ToggleCommand {
    /// The byte payload written to the characteristic.
    pub fn payload(&self) -> &'static [u8] {
        match self {
            Self::On => b"U",
            Self::Off => b"L",
        }
    }

    /// Whether this command switches on.
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for ToggleCommand {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// A live channel to one peripheral's serial characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChannel {
    address: String,
    peer_name: String,
    target: CharacteristicRef,
}

impl MessageChannel {
    /// Create a channel bound to the HM-10 characteristic of a peripheral.
    pub fn new(address: impl Into<String>, peer_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            peer_name: peer_name.into(),
            target: CharacteristicRef {
                service: HM10_SERVICE_UUID,
                characteristic: HM10_CHARACTERISTIC_UUID,
            },
        }
    }

    /// The subscribed characteristic.
    pub fn target(&self) -> CharacteristicRef {
        self.target
    }

    /// Peer address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Write a toggle command without waiting for an application-level reply.
    pub async fn send_toggle(
        &self,
        backend: &dyn BleBackend,
        command: ToggleCommand,
        with_response: bool,
    ) -> Result<()> {
        trace!("Writing {:?} to {}", command, self.address);
        backend
            .write_characteristic(&self.address, self.target, command.payload(), with_response)
            .await
    }

    /// Decode an inbound notification into a log line.
    ///
    /// Returns `None` for notifications from other characteristics and for
    /// payloads that are not valid UTF-8.
    pub fn decode(&self, characteristic: &uuid::Uuid, value: &[u8]) -> Option<String> {
        if *characteristic != self.target.characteristic {
            return None;
        }

        match std::str::from_utf8(value) {
            Ok(text) => Some(format!("Message from {}: {}", self.peer_name, text)),
            Err(e) => {
                warn!(
                    "Dropping malformed notification from {} ({} bytes): {}",
                    self.address,
                    value.len(),
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::backend::fake::{BackendCall, RecordingBackend};

    #[test]
    fn test_toggle_payloads() {
        assert_eq!(ToggleCommand::from(true).payload(), b"U");
        assert_eq!(ToggleCommand::from(false).payload(), b"L");
        assert!(ToggleCommand::On.is_on());
        assert!(!ToggleCommand::Off.is_on());
    }

    #[test]
    fn test_decode_text() {
        let channel = MessageChannel::new("AA:BB", "HM-10-BLE");
        assert_eq!(
            channel.decode(&HM10_CHARACTERISTIC_UUID, b"hello").as_deref(),
            Some("Message from HM-10-BLE: hello")
        );
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let channel = MessageChannel::new("AA:BB", "HM-10-BLE");
        assert!(channel
            .decode(&HM10_CHARACTERISTIC_UUID, &[0xff, 0xfe, 0x41])
            .is_none());
    }

    #[test]
    fn test_decode_ignores_other_characteristics() {
        let channel = MessageChannel::new("AA:BB", "HM-10-BLE");
        assert!(channel.decode(&HM10_SERVICE_UUID, b"hello").is_none());
    }

    #[tokio::test]
    async fn test_send_toggle_writes_single_byte() {
        let backend = RecordingBackend::new();
        let channel = MessageChannel::new("AA:BB", "HM-10-BLE");

        channel
            .send_toggle(&backend, ToggleCommand::On, false)
            .await
            .unwrap();

        assert_eq!(
            backend.calls(),
            vec![BackendCall::WriteCharacteristic(
                "AA:BB".to_string(),
                channel.target(),
                b"U".to_vec(),
                false
            )]
        );
    }
}
