//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy building blocks for
//! discovering HM-10 modules and talking to them.

pub mod advertisement;
pub mod backend;
pub mod btleplug_backend;
pub mod channel;
pub mod connection;
pub mod filter;
pub mod permissions;
pub mod scanner;
pub mod uuids;

pub use advertisement::{Advertisement, CandidatePeripheral};
pub use backend::{BleBackend, LinkState, PlatformEvent};
pub use btleplug_backend::BtleplugBackend;
pub use channel::{MessageChannel, ToggleCommand};
pub use connection::{ConnectionSession, SessionState};
pub use filter::DeviceFilter;
pub use permissions::{AlwaysGranted, Permission, PermissionGate, REQUIRED_PERMISSIONS};
pub use scanner::{ScanController, ScanState};
pub use uuids::*;
