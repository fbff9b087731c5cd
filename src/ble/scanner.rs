//! BLE scanning functionality.
//!
//! Provides the scan controller that runs time-boxed discovery windows and
//! accumulates unique HM-10 candidates.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::ble::advertisement::{Advertisement, CandidatePeripheral};
use crate::ble::backend::BleBackend;
use crate::ble::filter::DeviceFilter;
use crate::ble::permissions::{missing_permissions, PermissionGate};
use crate::error::{Error, Result};

/// Scanning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanState {
    /// Not scanning.
    #[default]
    Idle,
    /// A discovery window is open.
    Scanning,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
        }
    }
}

/// Outcome of a scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanToggle {
    /// A new discovery window was opened.
    Started,
    /// The running scan was stopped instead.
    Stopped,
}

/// Scan controller for discovering HM-10 peripherals.
pub struct ScanController {
    /// Backend used to start and stop discovery.
    backend: Arc<dyn BleBackend>,
    /// Filter applied to every advertisement.
    filter: DeviceFilter,
    /// Length of a discovery window.
    window: Duration,
    /// Current scan state.
    state: ScanState,
    /// Accepted candidates, in arrival order.
    candidates: Vec<CandidatePeripheral>,
    /// When the open window closes automatically.
    deadline: Option<Instant>,
}

impl ScanController {
    /// Create a new scan controller.
    pub fn new(backend: Arc<dyn BleBackend>, filter: DeviceFilter, window: Duration) -> Self {
        Self {
            backend,
            filter,
            window,
            state: ScanState::Idle,
            candidates: Vec::new(),
            deadline: None,
        }
    }

    /// Current scan state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    /// Candidates accepted so far.
    pub fn candidates(&self) -> &[CandidatePeripheral] {
        &self.candidates
    }

    /// Look up a candidate by address.
    pub fn find(&self, address: &str) -> Option<&CandidatePeripheral> {
        self.candidates.iter().find(|c| c.address == address)
    }

    /// When the current window stops automatically, if scanning.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Start a discovery window, or stop the running one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if any required permission is
    /// missing, or a backend error if discovery cannot be started.
    pub async fn start_scan(&mut self, permissions: &dyn PermissionGate) -> Result<ScanToggle> {
        if self.is_scanning() {
            debug!("Scan requested while scanning, stopping current scan");
            self.stop_scan().await?;
            return Ok(ScanToggle::Stopped);
        }

        let missing = missing_permissions(permissions);
        if !missing.is_empty() {
            warn!("Cannot scan, missing permissions: {:?}", missing);
            return Err(Error::PermissionDenied { missing });
        }

        self.candidates.clear();

        info!(
            "Starting BLE scan for '{}' devices ({:?} window)",
            self.filter.marker(),
            self.window
        );
        self.backend.start_scan().await?;

        self.state = ScanState::Scanning;
        self.deadline = Some(Instant::now() + self.window);

        Ok(ScanToggle::Started)
    }

    /// Stop scanning and cancel the automatic stop.
    pub async fn stop_scan(&mut self) -> Result<()> {
        if !self.is_scanning() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan ({} candidates)", self.candidates.len());

        self.state = ScanState::Idle;
        self.deadline = None;

        self.backend.stop_scan().await
    }

    /// Handle expiry of the discovery window.
    pub async fn on_window_elapsed(&mut self) -> Result<()> {
        debug!("Scan window elapsed");
        self.stop_scan().await
    }

    /// Process a single advertisement.
    ///
    /// Returns the new candidate if the advertisement was accepted and its
    /// address was not already known.
    pub fn on_advertisement(&mut self, adv: &Advertisement) -> Option<CandidatePeripheral> {
        if !self.is_scanning() {
            trace!("Ignoring advertisement outside scan window: {}", adv.address);
            return None;
        }

        if !self.filter.matches(adv) {
            return None;
        }

        if self.find(&adv.address).is_some() {
            return None;
        }

        let candidate = CandidatePeripheral::from_advertisement(adv)?;
        info!("Discovered candidate: {}", candidate.label());
        self.candidates.push(candidate.clone());

        Some(candidate)
    }

    /// Process a batch of advertisements in arrival order.
    pub fn on_batch(&mut self, advs: &[Advertisement]) -> Vec<CandidatePeripheral> {
        advs.iter()
            .filter_map(|adv| self.on_advertisement(adv))
            .collect()
    }

    /// Handle a platform scan failure. The scan simply ends.
    pub fn on_scan_failed(&mut self, code: i32) {
        warn!("Scan failed with error code: {}", code);
        self.state = ScanState::Idle;
        self.deadline = None;
    }

    /// Forget all candidates.
    pub fn clear_candidates(&mut self) {
        self.candidates.clear();
    }
}
