//! Error types for the hm10-ble crate.

use thiserror::Error;

use crate::ble::permissions::Permission;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// One or more required permissions were not granted.
    #[error("Permission denied: {missing:?}")]
    PermissionDenied {
        /// The permissions that are still missing.
        missing: Vec<Permission>,
    },

    /// The connected peripheral lacks the HM-10 service or characteristic.
    #[error("Incompatible device {address}: {reason}")]
    IncompatibleDevice {
        /// Address of the peripheral.
        address: String,
        /// What was missing.
        reason: String,
    },

    /// No candidate with the given address was discovered in the current scan.
    #[error("Candidate not found: {address}")]
    CandidateNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// The specified peripheral is not known to the backend.
    #[error("Peripheral not found: {address}")]
    PeripheralNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// The client event loop has stopped.
    #[error("Client closed")]
    ClientClosed,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CandidateNotFound {
            address: "AA:BB".to_string(),
        };
        assert_eq!(err.to_string(), "Candidate not found: AA:BB");

        let err = Error::IncompatibleDevice {
            address: "AA:BB".to_string(),
            reason: "service missing".to_string(),
        };
        assert_eq!(err.to_string(), "Incompatible device AA:BB: service missing");
    }

    #[test]
    fn test_permission_denied_lists_missing() {
        let err = Error::PermissionDenied {
            missing: vec![Permission::FineLocation],
        };
        assert!(err.to_string().contains("FineLocation"));
    }
}
