// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # hm10-ble
//!
//! A cross-platform Rust library for scanning, connecting to and exchanging
//! data with HM-10 Bluetooth Low Energy serial modules.
//!
//! The library owns the whole session lifecycle (scan, connect, discover
//! services, subscribe, exchange, disconnect) and exposes it to a UI as
//! immutable state snapshots plus a handful of intents.
//!
//! ## Features
//!
//! - **Discovery**: Time-boxed scans that collect unique HM-10 candidates
//! - **Session**: One peripheral at a time, with explicit teardown
//! - **Messaging**: Single-byte toggle commands and UTF-8 notifications
//! - **Pluggable backend**: btleplug by default, any [`ble::BleBackend`] for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hm10_ble::{ClientConfig, Hm10Client, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (client, task) = Hm10Client::with_btleplug(ClientConfig::default()).await?;
//!     client.scan().await?;
//!
//!     // Wait for the scan window to close
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!
//!     if let Some(candidate) = client.snapshot().candidates.first() {
//!         println!("Connecting to {}", candidate.label());
//!         client.connect(candidate.address.clone()).await?;
//!     }
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(3)).await;
//!     client.toggle(true).await?;
//!
//!     for line in client.snapshot().log {
//!         println!("{}", line);
//!     }
//!
//!     client.shutdown().await?;
//!     let _ = task.await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### macOS
//! Requires Bluetooth permission. Peripheral addresses are platform UUIDs
//! rather than MAC addresses.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod client;
pub mod config;
pub mod error;
pub mod state;

// Re-exports for convenience
pub use client::{ClientHandle, Hm10Client, Hm10Core, Intent};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use state::{LinkStatus, LogEntry, MessageLog, SessionEvent, SessionSnapshot};

pub use ble::{
    Advertisement, CandidatePeripheral, DeviceFilter, Permission, PermissionGate, ScanState,
    SessionState, ToggleCommand,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _ = std::any::TypeId::of::<Hm10Core>();
        let _ = std::any::TypeId::of::<ClientHandle>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<SessionSnapshot>();
        let _ = std::any::TypeId::of::<CandidatePeripheral>();
    }
}
