//! Platform backend abstraction.
//!
//! The core never talks to a Bluetooth stack directly. It issues commands
//! through an injected [`BleBackend`] and receives the outcome as a fixed set
//! of [`PlatformEvent`]s delivered on an [`EventSender`] handed to the backend
//! at construction time.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ble::advertisement::Advertisement;
use crate::error::Result;

/// Link state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// The link is established.
    Connected,
    /// The link is down, whether locally or remotely initiated.
    Disconnected,
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUIDs of the descriptors under this characteristic.
    pub descriptors: Vec<Uuid>,
}

/// A discovered GATT service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in this service.
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    /// Look up a characteristic by UUID.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

/// Address of a characteristic within a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    /// Owning service UUID.
    pub service: Uuid,
    /// Characteristic UUID.
    pub characteristic: Uuid,
}

/// Events delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// A single advertisement was observed.
    ScanResult(Advertisement),
    /// A batch of advertisements, in arrival order.
    BatchScanResults(Vec<Advertisement>),
    /// The platform could not run the scan.
    ScanFailed {
        /// Platform-specific error code.
        code: i32,
    },
    /// A peripheral link changed state.
    ConnectionStateChanged {
        /// Peripheral address.
        address: String,
        /// New link state.
        state: LinkState,
    },
    /// Service discovery finished.
    ServicesDiscovered {
        /// Peripheral address.
        address: String,
        /// Whether discovery succeeded.
        success: bool,
        /// Services found (empty on failure).
        services: Vec<GattService>,
    },
    /// A subscribed characteristic sent a notification.
    CharacteristicChanged {
        /// Peripheral address.
        address: String,
        /// Characteristic that changed.
        characteristic: Uuid,
        /// Raw notification value.
        value: Bytes,
    },
}

/// Sending half used by backends to deliver [`PlatformEvent`]s.
pub type EventSender = mpsc::UnboundedSender<PlatformEvent>;

/// Receiving half consumed by the core.
pub type EventReceiver = mpsc::UnboundedReceiver<PlatformEvent>;

/// Create a platform event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Commands the core issues to the Bluetooth stack.
///
/// Long-running operations (`connect`, `discover_services`) only initiate
/// work; their completion arrives later as a [`PlatformEvent`].
#[async_trait]
pub trait BleBackend: Send + Sync {
    /// Begin passive discovery.
    async fn start_scan(&self) -> Result<()>;

    /// Halt discovery.
    async fn stop_scan(&self) -> Result<()>;

    /// Initiate a link to a peripheral.
    async fn connect(&self, address: &str) -> Result<()>;

    /// Initiate service discovery on a connected peripheral.
    async fn discover_services(&self, address: &str) -> Result<()>;

    /// Enable or disable local delivery of notifications for a characteristic.
    async fn set_notify(&self, address: &str, target: CharacteristicRef, enabled: bool)
        -> Result<()>;

    /// Write a descriptor value under a characteristic.
    async fn write_descriptor(
        &self,
        address: &str,
        target: CharacteristicRef,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<()>;

    /// Write a characteristic value.
    async fn write_characteristic(
        &self,
        address: &str,
        target: CharacteristicRef,
        value: &[u8],
        with_response: bool,
    ) -> Result<()>;

    /// Release the link to a peripheral.
    async fn disconnect(&self, address: &str) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Backend that records every command for assertions.

    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum BackendCall {
        StartScan,
        StopScan,
        Connect(String),
        DiscoverServices(String),
        SetNotify(String, CharacteristicRef, bool),
        WriteDescriptor(String, CharacteristicRef, Uuid, Vec<u8>),
        WriteCharacteristic(String, CharacteristicRef, Vec<u8>, bool),
        Disconnect(String),
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingBackend {
        calls: Mutex<Vec<BackendCall>>,
        fail_start_scan: AtomicBool,
    }

    impl RecordingBackend {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn fail_start_scan(&self) {
            self.fail_start_scan.store(true, Ordering::SeqCst);
        }

        pub(crate) fn calls(&self) -> Vec<BackendCall> {
            self.calls.lock().clone()
        }

        pub(crate) fn clear(&self) {
            self.calls.lock().clear();
        }

        pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    BackendCall::WriteCharacteristic(_, _, value, _) => Some(value.clone()),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: BackendCall) {
            self.calls.lock().push(call);
        }
    }

    #[async_trait]
    impl BleBackend for RecordingBackend {
        async fn start_scan(&self) -> Result<()> {
            if self.fail_start_scan.load(Ordering::SeqCst) {
                return Err(crate::error::Error::BluetoothUnavailable);
            }
            self.record(BackendCall::StartScan);
            Ok(())
        }

        async fn stop_scan(&self) -> Result<()> {
            self.record(BackendCall::StopScan);
            Ok(())
        }

        async fn connect(&self, address: &str) -> Result<()> {
            self.record(BackendCall::Connect(address.to_string()));
            Ok(())
        }

        async fn discover_services(&self, address: &str) -> Result<()> {
            self.record(BackendCall::DiscoverServices(address.to_string()));
            Ok(())
        }

        async fn set_notify(
            &self,
            address: &str,
            target: CharacteristicRef,
            enabled: bool,
        ) -> Result<()> {
            self.record(BackendCall::SetNotify(address.to_string(), target, enabled));
            Ok(())
        }

        async fn write_descriptor(
            &self,
            address: &str,
            target: CharacteristicRef,
            descriptor: Uuid,
            value: &[u8],
        ) -> Result<()> {
            self.record(BackendCall::WriteDescriptor(
                address.to_string(),
                target,
                descriptor,
                value.to_vec(),
            ));
            Ok(())
        }

        async fn write_characteristic(
            &self,
            address: &str,
            target: CharacteristicRef,
            value: &[u8],
            with_response: bool,
        ) -> Result<()> {
            self.record(BackendCall::WriteCharacteristic(
                address.to_string(),
                target,
                value.to_vec(),
                with_response,
            ));
            Ok(())
        }

        async fn disconnect(&self, address: &str) -> Result<()> {
            self.record(BackendCall::Disconnect(address.to_string()));
            Ok(())
        }
    }

    /// Services exposed by a genuine HM-10 module.
    pub(crate) fn hm10_services() -> Vec<GattService> {
        use crate::ble::uuids::*;
        vec![GattService {
            uuid: HM10_SERVICE_UUID,
            characteristics: vec![GattCharacteristic {
                uuid: HM10_CHARACTERISTIC_UUID,
                descriptors: vec![CCCD_UUID],
            }],
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::*;

    #[test]
    fn test_service_characteristic_lookup() {
        let services = fake::hm10_services();
        let service = &services[0];
        assert!(service.characteristic(&HM10_CHARACTERISTIC_UUID).is_some());
        assert!(service.characteristic(&HM10_SERVICE_UUID).is_none());
    }

    #[tokio::test]
    async fn test_event_channel_preserves_order() {
        let (tx, mut rx) = event_channel();
        tx.send(PlatformEvent::ScanFailed { code: 1 }).unwrap();
        tx.send(PlatformEvent::ScanFailed { code: 2 }).unwrap();
        assert_eq!(rx.recv().await, Some(PlatformEvent::ScanFailed { code: 1 }));
        assert_eq!(rx.recv().await, Some(PlatformEvent::ScanFailed { code: 2 }));
    }
}
