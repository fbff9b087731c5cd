//! Backend built on btleplug.
//!
//! Translates core commands into btleplug calls and forwards adapter,
//! connection and notification activity as [`PlatformEvent`]s.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::advertisement::Advertisement;
use crate::ble::backend::{
    BleBackend, CharacteristicRef, EventSender, GattCharacteristic, GattService, LinkState,
    PlatformEvent,
};
use crate::error::{Error, Result};

/// Platform identity string for a peripheral.
fn address_of(id: &PeripheralId) -> String {
    id.to_string()
}

/// Notification forwarding tasks keyed by address.
#[derive(Clone, Default)]
struct NotifyTasks {
    handles: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
}

impl NotifyTasks {
    /// Whether a live task forwards notifications for `address`.
    ///
    /// A finished task is dropped from the map.
    fn is_running(&self, address: &str) -> bool {
        let mut handles = self.handles.write();
        match handles.get(address) {
            Some(handle) if handle.is_finished() => {
                handles.remove(address);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn insert(&self, address: String, handle: JoinHandle<()>) {
        if let Some(old) = self.handles.write().insert(address, handle) {
            old.abort();
        }
    }

    fn stop(&self, address: &str) {
        if let Some(handle) = self.handles.write().remove(address) {
            handle.abort();
        }
    }

    fn stop_all(&self) {
        for (_, handle) in self.handles.write().drain() {
            handle.abort();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.handles.read().len()
    }
}

/// BLE backend for desktop platforms.
pub struct BtleplugBackend {
    /// The BLE adapter in use.
    adapter: Adapter,
    /// Peripherals seen so far, keyed by address.
    peripherals: Arc<RwLock<HashMap<String, Peripheral>>>,
    /// Where platform events go.
    event_tx: EventSender,
    /// Adapter event forwarding task.
    central_handle: RwLock<Option<JoinHandle<()>>>,
    /// Notification forwarding tasks by address.
    notify_tasks: NotifyTasks,
}

impl BtleplugBackend {
    /// Create a backend on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(event_tx: EventSender) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Self::with_adapter(adapter, event_tx).await
    }

    /// Create a backend on a specific adapter.
    pub async fn with_adapter(adapter: Adapter, event_tx: EventSender) -> Result<Self> {
        let backend = Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            central_handle: RwLock::new(None),
            notify_tasks: NotifyTasks::default(),
        };

        backend.start_central_events().await?;

        Ok(backend)
    }

    /// Forward adapter events for the lifetime of the backend.
    async fn start_central_events(&self) -> Result<()> {
        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();
        let event_tx = self.event_tx.clone();
        let notify_tasks = self.notify_tasks.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                Self::handle_central_event(event, &adapter, &peripherals, &notify_tasks, &event_tx)
                    .await;
            }
            debug!("Adapter event stream ended");
        });

        *self.central_handle.write() = Some(handle);

        Ok(())
    }

    async fn handle_central_event(
        event: CentralEvent,
        adapter: &Adapter,
        peripherals: &Arc<RwLock<HashMap<String, Peripheral>>>,
        notify_tasks: &NotifyTasks,
        event_tx: &EventSender,
    ) {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                trace!("Device seen: {:?}", id);

                let peripheral = match adapter.peripheral(&id).await {
                    Ok(p) => p,
                    Err(e) => {
                        trace!("Failed to get peripheral: {}", e);
                        return;
                    }
                };

                let properties = match peripheral.properties().await {
                    Ok(Some(p)) => p,
                    _ => return,
                };

                let address = address_of(&id);
                peripherals.write().insert(address.clone(), peripheral);

                let _ = event_tx.send(PlatformEvent::ScanResult(Advertisement {
                    name: properties.local_name,
                    address,
                }));
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
                let address = address_of(&id);
                notify_tasks.stop(&address);
                let _ = event_tx.send(PlatformEvent::ConnectionStateChanged {
                    address,
                    state: LinkState::Disconnected,
                });
            }
            CentralEvent::DeviceConnected(id) => {
                trace!("Device connected: {:?}", id);
            }
            _ => {}
        }
    }

    /// Look up a peripheral by address, falling back to the adapter's list.
    async fn peripheral(&self, address: &str) -> Result<Peripheral> {
        if let Some(p) = self.peripherals.read().get(address).cloned() {
            return Ok(p);
        }

        let found = self
            .adapter
            .peripherals()
            .await
            .map_err(Error::Bluetooth)?
            .into_iter()
            .find(|p| address_of(&p.id()) == address)
            .ok_or_else(|| Error::PeripheralNotFound {
                address: address.to_string(),
            })?;

        self.peripherals
            .write()
            .insert(address.to_string(), found.clone());

        Ok(found)
    }

    async fn characteristic(
        &self,
        address: &str,
        target: CharacteristicRef,
    ) -> Result<(Peripheral, Characteristic)> {
        let peripheral = self.peripheral(address).await?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == target.characteristic && c.service_uuid == target.service)
            .ok_or_else(|| Error::IncompatibleDevice {
                address: address.to_string(),
                reason: format!("characteristic {} not found", target.characteristic),
            })?;

        Ok((peripheral, characteristic))
    }

    fn start_notifications(&self, address: &str, peripheral: Peripheral) {
        if self.notify_tasks.is_running(address) {
            return;
        }

        let address_owned = address.to_string();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notifications stream: {}", e);
                    return;
                }
            };

            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification from {}: {} bytes",
                    notification.uuid,
                    notification.value.len()
                );

                let _ = event_tx.send(PlatformEvent::CharacteristicChanged {
                    address: address_owned.clone(),
                    characteristic: notification.uuid,
                    value: Bytes::from(notification.value),
                });
            }

            debug!("Notification stream for {} ended", address_owned);
        });

        self.notify_tasks.insert(address.to_string(), handle);
    }
}

#[async_trait]
impl BleBackend for BtleplugBackend {
    async fn start_scan(&self) -> Result<()> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }

    async fn connect(&self, address: &str) -> Result<()> {
        let peripheral = self.peripheral(address).await?;
        let event_tx = self.event_tx.clone();
        let address = address.to_string();

        tokio::spawn(async move {
            let state = match peripheral.connect().await {
                Ok(()) => LinkState::Connected,
                Err(e) => {
                    warn!("Connection to {} failed: {}", address, e);
                    LinkState::Disconnected
                }
            };
            let _ = event_tx.send(PlatformEvent::ConnectionStateChanged { address, state });
        });

        Ok(())
    }

    async fn discover_services(&self, address: &str) -> Result<()> {
        let peripheral = self.peripheral(address).await?;
        let event_tx = self.event_tx.clone();
        let address = address.to_string();

        tokio::spawn(async move {
            let (success, services) = match peripheral.discover_services().await {
                Ok(()) => {
                    let services = peripheral
                        .services()
                        .into_iter()
                        .map(|s| GattService {
                            uuid: s.uuid,
                            characteristics: s
                                .characteristics
                                .into_iter()
                                .map(|c| GattCharacteristic {
                                    uuid: c.uuid,
                                    descriptors: c.descriptors.into_iter().map(|d| d.uuid).collect(),
                                })
                                .collect(),
                        })
                        .collect::<Vec<_>>();
                    debug!("Discovered {} services on {}", services.len(), address);
                    (true, services)
                }
                Err(e) => {
                    warn!("Service discovery on {} failed: {}", address, e);
                    (false, Vec::new())
                }
            };

            let _ = event_tx.send(PlatformEvent::ServicesDiscovered {
                address,
                success,
                services,
            });
        });

        Ok(())
    }

    async fn set_notify(
        &self,
        address: &str,
        target: CharacteristicRef,
        enabled: bool,
    ) -> Result<()> {
        let (peripheral, characteristic) = self.characteristic(address, target).await?;

        if enabled {
            peripheral
                .subscribe(&characteristic)
                .await
                .map_err(Error::Bluetooth)?;
            debug!("Subscribed to notifications from {}", characteristic.uuid);
            self.start_notifications(address, peripheral);
        } else {
            self.notify_tasks.stop(address);
            peripheral
                .unsubscribe(&characteristic)
                .await
                .map_err(Error::Bluetooth)?;
        }

        Ok(())
    }

    async fn write_descriptor(
        &self,
        address: &str,
        target: CharacteristicRef,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<()> {
        let (peripheral, characteristic) = self.characteristic(address, target).await?;

        let descriptor = characteristic
            .descriptors
            .iter()
            .find(|d| d.uuid == descriptor)
            .cloned()
            .ok_or_else(|| Error::IncompatibleDevice {
                address: address.to_string(),
                reason: format!("descriptor {} not found", descriptor),
            })?;

        peripheral
            .write_descriptor(&descriptor, value)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to descriptor {}", value.len(), descriptor.uuid);

        Ok(())
    }

    async fn write_characteristic(
        &self,
        address: &str,
        target: CharacteristicRef,
        value: &[u8],
        with_response: bool,
    ) -> Result<()> {
        let (peripheral, characteristic) = self.characteristic(address, target).await?;

        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        peripheral
            .write(&characteristic, value, write_type)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to characteristic {}", value.len(), characteristic.uuid);

        Ok(())
    }

    async fn disconnect(&self, address: &str) -> Result<()> {
        self.notify_tasks.stop(address);

        let peripheral = self.peripheral(address).await?;
        peripheral.disconnect().await.map_err(Error::Bluetooth)?;

        info!("Disconnected from {}", address);

        Ok(())
    }
}

impl Drop for BtleplugBackend {
    fn drop(&mut self) {
        if let Some(handle) = self.central_handle.write().take() {
            handle.abort();
        }
        self.notify_tasks.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BtleplugBackend>();
    }

    #[tokio::test]
    async fn test_finished_notify_task_is_replaced() {
        let tasks = NotifyTasks::default();
        let ended = tokio::spawn(async {});
        tasks.insert("AA".to_string(), ended);
        tokio::task::yield_now().await;
        while !tasks.handles.read()["AA"].is_finished() {
            tokio::task::yield_now().await;
        }

        assert!(!tasks.is_running("AA"));
        assert_eq!(tasks.len(), 0);
    }

    #[tokio::test]
    async fn test_stop_drops_live_notify_task() {
        let tasks = NotifyTasks::default();
        tasks.insert("AA".to_string(), tokio::spawn(std::future::pending::<()>()));
        assert!(tasks.is_running("AA"));

        // Peer dropped the link.
        tasks.stop("AA");

        assert!(!tasks.is_running("AA"));
        assert_eq!(tasks.len(), 0);
    }
}
