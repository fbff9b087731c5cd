//! BLE connection management.
//!
//! Drives a single peripheral through connect, service discovery,
//! notification subscription and teardown.

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::advertisement::CandidatePeripheral;
use crate::ble::backend::{BleBackend, GattService, LinkState};
use crate::ble::channel::{MessageChannel, ToggleCommand};
use crate::ble::uuids::*;
use crate::error::{Error, Result};
use crate::state::{LinkStatus, MessageLog};

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    /// No session has been started.
    #[default]
    Idle,
    /// Link requested, waiting for the platform.
    Connecting,
    /// Link is up, services are being discovered.
    DiscoveringServices,
    /// Notifications are enabled and the channel is usable.
    Ready,
    /// Local teardown in progress.
    Disconnecting,
    /// The link is down.
    Disconnected,
    /// The peripheral turned out to be unusable.
    Failed,
}

impl SessionState {
    /// Check if the channel is usable.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Project onto the two-valued status the UI shows.
    pub fn link_status(&self) -> LinkStatus {
        match self {
            Self::DiscoveringServices | Self::Ready => LinkStatus::Connected,
            _ => LinkStatus::Disconnected,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::DiscoveringServices => write!(f, "DiscoveringServices"),
            Self::Ready => write!(f, "Ready"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// The single connect-through-disconnect lifecycle with one peripheral.
pub struct ConnectionSession {
    /// Backend used for all link operations.
    backend: Arc<dyn BleBackend>,
    /// Current state.
    state: SessionState,
    /// Peripheral this session targets.
    peripheral: Option<CandidatePeripheral>,
    /// Usable channel once `Ready`.
    channel: Option<MessageChannel>,
    /// Connection events and inbound messages.
    log: MessageLog,
    /// Last toggle value written.
    toggled_on: bool,
    /// Whether toggle writes wait for a link-layer response.
    write_with_response: bool,
    /// Address whose link was released locally and whose disconnect
    /// report may still be in flight.
    released: Option<String>,
}

impl ConnectionSession {
    /// Create an idle session.
    pub fn new(backend: Arc<dyn BleBackend>, write_with_response: bool) -> Self {
        Self {
            backend,
            state: SessionState::Idle,
            peripheral: None,
            channel: None,
            log: MessageLog::new(),
            toggled_on: false,
            write_with_response,
            released: None,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The session's peripheral.
    pub fn peripheral(&self) -> Option<&CandidatePeripheral> {
        self.peripheral.as_ref()
    }

    /// The live channel, only while `Ready`.
    pub fn channel(&self) -> Option<&MessageChannel> {
        self.channel.as_ref()
    }

    /// The message log.
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Last toggle value written.
    pub fn toggled_on(&self) -> bool {
        self.toggled_on
    }

    /// Start a link to `candidate`, tearing down any existing session first.
    ///
    /// Completion is reported later through [`Self::on_link_state`].
    pub async fn connect(&mut self, candidate: CandidatePeripheral) -> Result<()> {
        if self.peripheral.is_some() {
            debug!("Tearing down previous session before connecting");
            if let Err(e) = self.teardown().await {
                warn!("Error releasing previous link: {}", e);
            }
        }

        info!("Connecting to {}", candidate.label());

        let address = candidate.address.clone();
        if self.released.as_deref() != Some(address.as_str()) {
            self.released = None;
        }
        self.peripheral = Some(candidate);
        self.set_state(SessionState::Connecting);

        if let Err(e) = self.backend.connect(&address).await {
            warn!("Failed to initiate link to {}: {}", address, e);
            self.set_state(SessionState::Disconnected);
            return Err(e);
        }

        Ok(())
    }

    /// Handle a link-state change reported by the platform.
    pub async fn on_link_state(&mut self, address: &str, link: LinkState) -> Result<()> {
        let Some(peripheral) = self.current_peer(address) else {
            debug!("Ignoring link event for {}: not the session peer", address);
            return Ok(());
        };

        match link {
            LinkState::Connected => {
                if self.state != SessionState::Connecting {
                    debug!("Ignoring connected event in state {}", self.state);
                    return Ok(());
                }

                self.released = None;
                info!("Connected to {}", peripheral.label());
                self.log.push(format!("Connected to {}", peripheral.name));
                self.set_state(SessionState::DiscoveringServices);

                if let Err(e) = self.backend.discover_services(address).await {
                    return Err(self.fail(format!("service discovery could not start: {}", e)).await);
                }
                Ok(())
            }
            LinkState::Disconnected => {
                if self.state == SessionState::Disconnected {
                    return Ok(());
                }

                // The previous link to this peer reporting its teardown.
                if self.state == SessionState::Connecting
                    && self.released.as_deref() == Some(address)
                {
                    debug!("Ignoring disconnect of released link to {}", address);
                    self.released = None;
                    return Ok(());
                }

                info!("Disconnected from {}", peripheral.label());
                self.log.push(format!("Disconnected from {}", peripheral.name));
                self.channel = None;
                self.toggled_on = false;
                self.set_state(SessionState::Disconnected);
                Ok(())
            }
        }
    }

    /// Handle completion of service discovery.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompatibleDevice`] when discovery failed or the
    /// HM-10 service/characteristic is absent. The link is released.
    pub async fn on_services_discovered(
        &mut self,
        address: &str,
        success: bool,
        services: &[GattService],
    ) -> Result<()> {
        if self.current_peer(address).is_none()
            || self.state != SessionState::DiscoveringServices
        {
            debug!("Ignoring service discovery result for {}", address);
            return Ok(());
        }

        if !success {
            return Err(self.fail("service discovery failed".to_string()).await);
        }

        let Some(service) = services.iter().find(|s| is_hm10_service(&s.uuid)) else {
            return Err(self.fail(format!("service {} not found", HM10_SERVICE_UUID)).await);
        };

        let Some(characteristic) = service.characteristic(&HM10_CHARACTERISTIC_UUID) else {
            return Err(self
                .fail(format!("characteristic {} not found", HM10_CHARACTERISTIC_UUID))
                .await);
        };
        let has_cccd = characteristic.descriptors.contains(&CCCD_UUID);

        let name = self
            .peripheral
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let channel = MessageChannel::new(address, name);

        if let Err(e) = self
            .backend
            .set_notify(address, channel.target(), true)
            .await
        {
            return Err(self.fail(format!("enabling notifications failed: {}", e)).await);
        }

        if has_cccd {
            if let Err(e) = self
                .backend
                .write_descriptor(address, channel.target(), CCCD_UUID, &ENABLE_NOTIFICATION_VALUE)
                .await
            {
                return Err(self.fail(format!("writing CCCD failed: {}", e)).await);
            }
        } else {
            debug!("No CCCD on {}, relying on platform subscription", address);
        }

        self.channel = Some(channel);
        self.set_state(SessionState::Ready);
        info!("Session with {} ready", address);

        Ok(())
    }

    /// Handle an inbound notification. Returns `true` if a log line was added.
    pub fn on_notification(&mut self, address: &str, characteristic: &Uuid, value: &[u8]) -> bool {
        if !self.state.is_ready() {
            return false;
        }

        let Some(channel) = self.channel.as_ref().filter(|c| c.address() == address) else {
            return false;
        };

        match channel.decode(characteristic, value) {
            Some(line) => {
                self.log.push(line);
                true
            }
            None => false,
        }
    }

    /// Write a toggle command.
    ///
    /// Returns `Ok(false)` without writing when the session is not `Ready`.
    pub async fn send_toggle(&mut self, on: bool) -> Result<bool> {
        let channel = match (&self.channel, self.state.is_ready()) {
            (Some(channel), true) => channel.clone(),
            _ => {
                debug!("Dropping toggle: session is {}", self.state);
                return Ok(false);
            }
        };

        channel
            .send_toggle(self.backend.as_ref(), ToggleCommand::from(on), self.write_with_response)
            .await?;
        self.toggled_on = on;

        Ok(true)
    }

    /// Explicit local teardown.
    ///
    /// Always leaves the session `Disconnected` with an empty log.
    pub async fn disconnect(&mut self) -> Result<()> {
        let result = self.teardown().await;
        self.released = None;
        result
    }

    /// Release the link and reset the session record.
    async fn teardown(&mut self) -> Result<()> {
        let peripheral = self.peripheral.take();
        self.channel = None;

        let result = match &peripheral {
            Some(p) if self.state != SessionState::Disconnected => {
                info!("Disconnecting from {}", p.label());
                self.set_state(SessionState::Disconnecting);
                self.released = Some(p.address.clone());
                self.backend.disconnect(&p.address).await
            }
            _ => Ok(()),
        };

        self.log.clear();
        self.toggled_on = false;
        self.set_state(SessionState::Disconnected);

        result
    }

    /// Mark the session failed and release the link.
    async fn fail(&mut self, reason: String) -> Error {
        let address = self
            .peripheral
            .as_ref()
            .map(|p| p.address.clone())
            .unwrap_or_default();

        warn!("Incompatible device {}: {}", address, reason);

        self.channel = None;
        self.set_state(SessionState::Failed);

        if let Err(e) = self.backend.disconnect(&address).await {
            warn!("Failed to release link to {}: {}", address, e);
        }

        Error::IncompatibleDevice { address, reason }
    }

    fn current_peer(&self, address: &str) -> Option<CandidatePeripheral> {
        self.peripheral
            .as_ref()
            .filter(|p| p.address == address)
            .cloned()
    }

    fn set_state(&mut self, new_state: SessionState) {
        if self.state != new_state {
            debug!("Session state changed: {} -> {}", self.state, new_state);
            self.state = new_state;
        }
    }
}
