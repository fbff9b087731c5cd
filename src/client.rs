//! Single-owner core and the handle the UI talks to.
//!
//! [`Hm10Core`] owns the scan controller and the connection session. One
//! task runs [`Hm10Core::run`], which processes UI intents, platform events
//! and scan-window expiry strictly one at a time. Renderers observe state
//! through a `watch` channel and never touch the core directly.

use std::future::pending;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::backend::{event_channel, BleBackend, EventReceiver, PlatformEvent};
use crate::ble::btleplug_backend::BtleplugBackend;
use crate::ble::connection::{ConnectionSession, SessionState};
use crate::ble::permissions::{missing_permissions, AlwaysGranted, PermissionGate};
use crate::ble::scanner::{ScanController, ScanToggle};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::state::{SessionEvent, SessionSnapshot};

/// User intents forwarded by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Start a scan, or stop the running one.
    StartScan,
    /// Stop scanning.
    StopScan,
    /// Connect to the candidate with this address.
    Connect(String),
    /// Write the toggle command.
    Toggle(bool),
    /// Tear down the session.
    Disconnect,
    /// Stop the core.
    Shutdown,
}

/// The BLE session core.
pub struct Hm10Core {
    scanner: ScanController,
    session: ConnectionSession,
    permissions: Arc<dyn PermissionGate>,
    state_tx: watch::Sender<SessionSnapshot>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Hm10Core {
    /// Create a core around an injected backend and permission gate.
    pub fn new(
        backend: Arc<dyn BleBackend>,
        permissions: Arc<dyn PermissionGate>,
        config: &ClientConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionSnapshot::default());
        let (event_tx, _) = broadcast::channel(config.event_capacity);

        Self {
            scanner: ScanController::new(
                backend.clone(),
                config.device_filter(),
                config.scan_window,
            ),
            session: ConnectionSession::new(backend, config.write_with_response),
            permissions,
            state_tx,
            event_tx,
        }
    }

    /// Build a snapshot of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let session_state = self.session.state();
        SessionSnapshot {
            status: session_state.link_status(),
            session_state,
            scan_state: self.scanner.state(),
            candidates: self.scanner.candidates().to_vec(),
            log: self.session.log().lines(),
            toggled_on: self.session.toggled_on(),
            peripheral: self.session.peripheral().cloned(),
        }
    }

    /// Subscribe to state snapshots.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Handle the scan intent: prompt for missing permissions, then start
    /// a scan or stop the running one.
    pub async fn request_scan(&mut self) -> Result<()> {
        if !self.scanner.is_scanning() {
            let missing = missing_permissions(self.permissions.as_ref());
            if !missing.is_empty() {
                info!("Requesting permissions: {:?}", missing);
                if !self.permissions.request(missing.clone()).await {
                    warn!("Permissions denied, scan not started");
                    self.emit(SessionEvent::PermissionDenied(missing.clone()));
                    return Err(Error::PermissionDenied { missing });
                }
            }
        }

        let result = self.scanner.start_scan(self.permissions.as_ref()).await;
        match &result {
            Ok(ScanToggle::Started) => self.emit(SessionEvent::ScanStarted),
            Ok(ScanToggle::Stopped) => self.emit(SessionEvent::ScanStopped),
            Err(Error::PermissionDenied { missing }) => {
                self.emit(SessionEvent::PermissionDenied(missing.clone()))
            }
            Err(_) => {}
        }
        self.publish();

        result.map(|_| ())
    }

    /// Stop scanning. No-op when idle.
    pub async fn stop_scan(&mut self) -> Result<()> {
        let was_scanning = self.scanner.is_scanning();
        let result = self.scanner.stop_scan().await;
        if was_scanning {
            self.emit(SessionEvent::ScanStopped);
        }
        self.publish();
        result
    }

    /// Connect to a discovered candidate.
    ///
    /// Any running scan is stopped first since scanning while connected is
    /// not supported.
    pub async fn connect(&mut self, address: &str) -> Result<()> {
        let candidate = self
            .scanner
            .find(address)
            .cloned()
            .ok_or_else(|| Error::CandidateNotFound {
                address: address.to_string(),
            })?;

        if self.scanner.is_scanning() {
            if let Err(e) = self.stop_scan().await {
                warn!("Failed to stop scan before connecting: {}", e);
            }
        }

        let result = self.session.connect(candidate).await;
        self.publish();
        result
    }

    /// Write the toggle command. Returns `Ok(false)` if dropped.
    pub async fn send_toggle(&mut self, on: bool) -> Result<bool> {
        let result = self.session.send_toggle(on).await;
        self.publish();
        result
    }

    /// Tear down the session and forget the candidates.
    pub async fn disconnect(&mut self) -> Result<()> {
        let address = self.session.peripheral().map(|p| p.address.clone());
        let result = self.session.disconnect().await;
        self.scanner.clear_candidates();
        if let Some(address) = address {
            self.emit(SessionEvent::Disconnected { address });
        }
        self.publish();
        result
    }

    /// Process one platform event.
    pub async fn handle_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::ScanResult(adv) => {
                if let Some(candidate) = self.scanner.on_advertisement(&adv) {
                    self.emit(SessionEvent::CandidateDiscovered(candidate));
                }
            }
            PlatformEvent::BatchScanResults(advs) => {
                for candidate in self.scanner.on_batch(&advs) {
                    self.emit(SessionEvent::CandidateDiscovered(candidate));
                }
            }
            PlatformEvent::ScanFailed { code } => {
                self.scanner.on_scan_failed(code);
                self.emit(SessionEvent::ScanFailed { code });
            }
            PlatformEvent::ConnectionStateChanged { address, state } => {
                let before = self.session.state();
                if let Err(e) = self.session.on_link_state(&address, state).await {
                    self.emit(SessionEvent::Error(e.to_string()));
                }
                if before != SessionState::Disconnected
                    && self.session.state() == SessionState::Disconnected
                {
                    self.emit(SessionEvent::Disconnected { address });
                }
            }
            PlatformEvent::ServicesDiscovered {
                address,
                success,
                services,
            } => match self
                .session
                .on_services_discovered(&address, success, &services)
                .await
            {
                Ok(()) if self.session.state().is_ready() => {
                    self.emit(SessionEvent::Ready { address });
                }
                Ok(()) => {}
                Err(e) => self.emit(SessionEvent::Error(e.to_string())),
            },
            PlatformEvent::CharacteristicChanged {
                address,
                characteristic,
                value,
            } => {
                self.session
                    .on_notification(&address, &characteristic, &value);
            }
        }

        self.publish();
    }

    /// Close the discovery window.
    pub async fn on_scan_window_elapsed(&mut self) {
        if let Err(e) = self.scanner.on_window_elapsed().await {
            warn!("Failed to stop scan at window end: {}", e);
        }
        self.emit(SessionEvent::ScanStopped);
        self.publish();
    }

    /// Process one intent. Returns `false` when the core should stop.
    pub async fn handle_intent(&mut self, intent: Intent) -> bool {
        debug!("Handling intent {:?}", intent);

        let result = match intent {
            Intent::StartScan => self.request_scan().await,
            Intent::StopScan => self.stop_scan().await,
            Intent::Connect(address) => self.connect(&address).await,
            Intent::Toggle(on) => self.send_toggle(on).await.map(|_| ()),
            Intent::Disconnect => self.disconnect().await,
            Intent::Shutdown => return false,
        };

        if let Err(e) = result {
            warn!("Intent failed: {}", e);
            // Permission denials are already reported.
            if !matches!(e, Error::PermissionDenied { .. }) {
                self.emit(SessionEvent::Error(e.to_string()));
            }
        }

        true
    }

    /// Run the event loop until shut down.
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>, mut events: EventReceiver) {
        info!("HM-10 core started");
        self.publish();

        loop {
            let deadline = self.scanner.deadline();

            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        if !self.handle_intent(intent).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }
                _ = wait_until(deadline) => {
                    self.on_scan_window_elapsed().await;
                }
            }
        }

        self.shutdown().await;
        info!("HM-10 core stopped");
    }

    /// Stop scanning and release the link.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.scanner.stop_scan().await {
            warn!("Error stopping scan during shutdown: {}", e);
        }
        if let Err(e) = self.session.disconnect().await {
            warn!("Error disconnecting during shutdown: {}", e);
        }
        self.publish();
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot());
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}

/// Cloneable handle for issuing intents and observing state.
#[derive(Clone)]
pub struct ClientHandle {
    intent_tx: mpsc::Sender<Intent>,
    state_rx: watch::Receiver<SessionSnapshot>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl ClientHandle {
    async fn send(&self, intent: Intent) -> Result<()> {
        self.intent_tx
            .send(intent)
            .await
            .map_err(|_| Error::ClientClosed)
    }

    /// Start a scan, or stop the running one.
    pub async fn scan(&self) -> Result<()> {
        self.send(Intent::StartScan).await
    }

    /// Stop scanning.
    pub async fn stop_scan(&self) -> Result<()> {
        self.send(Intent::StopScan).await
    }

    /// Connect to a candidate by address.
    pub async fn connect(&self, address: impl Into<String>) -> Result<()> {
        self.send(Intent::Connect(address.into())).await
    }

    /// Write the toggle command.
    pub async fn toggle(&self, on: bool) -> Result<()> {
        self.send(Intent::Toggle(on)).await
    }

    /// Tear down the session.
    pub async fn disconnect(&self) -> Result<()> {
        self.send(Intent::Disconnect).await
    }

    /// Stop the core.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Intent::Shutdown).await
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state snapshots.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }

    /// Subscribe to session events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }
}

/// Entry points for running a core on a tokio task.
pub struct Hm10Client;

impl Hm10Client {
    /// Spawn a core driven by the given backend and its event receiver.
    pub fn spawn(
        backend: Arc<dyn BleBackend>,
        events: EventReceiver,
        permissions: Arc<dyn PermissionGate>,
        config: ClientConfig,
    ) -> (ClientHandle, JoinHandle<()>) {
        let core = Hm10Core::new(backend, permissions, &config);
        let (intent_tx, intent_rx) = mpsc::channel(config.intent_capacity);

        let handle = ClientHandle {
            intent_tx,
            state_rx: core.subscribe_state(),
            event_tx: core.event_tx.clone(),
        };

        let task = tokio::spawn(core.run(intent_rx, events));

        (handle, task)
    }

    /// Spawn a core on the first system Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn with_btleplug(config: ClientConfig) -> Result<(ClientHandle, JoinHandle<()>)> {
        let (event_tx, event_rx) = event_channel();
        let backend = BtleplugBackend::new(event_tx).await?;

        Ok(Self::spawn(
            Arc::new(backend),
            event_rx,
            Arc::new(AlwaysGranted),
            config,
        ))
    }
}
