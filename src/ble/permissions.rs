//! Runtime permissions required before scanning.
//!
//! Mobile platforms gate BLE discovery behind user-granted permissions.
//! The [`PermissionGate`] trait is the seam the host application implements
//! to check and prompt for them.

use async_trait::async_trait;

/// A platform permission needed for BLE discovery and connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Permission {
    /// Permission to scan for BLE peripherals.
    BluetoothScan,
    /// Permission to connect to BLE peripherals.
    BluetoothConnect,
    /// Fine-grained location.
    FineLocation,
    /// Coarse-grained location.
    CoarseLocation,
}

/// Every permission that must be granted before a scan may start.
pub const REQUIRED_PERMISSIONS: [Permission; 4] = [
    Permission::BluetoothScan,
    Permission::BluetoothConnect,
    Permission::FineLocation,
    Permission::CoarseLocation,
];

/// Checks and requests platform permissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Whether a permission is currently granted.
    fn is_granted(&self, permission: Permission) -> bool;

    /// Prompt the user for the given permissions.
    ///
    /// Returns `true` only if all of them were granted.
    async fn request(&self, permissions: Vec<Permission>) -> bool;
}

/// Permission gate for platforms where the OS handles BLE consent itself
/// (desktop Linux, macOS, Windows).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    fn is_granted(&self, _permission: Permission) -> bool {
        true
    }

    async fn request(&self, _permissions: Vec<Permission>) -> bool {
        true
    }
}

/// Return the required permissions the gate reports as not granted.
pub fn missing_permissions(gate: &dyn PermissionGate) -> Vec<Permission> {
    REQUIRED_PERMISSIONS
        .iter()
        .copied()
        .filter(|p| !gate.is_granted(*p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_granted_has_nothing_missing() {
        assert!(missing_permissions(&AlwaysGranted).is_empty());
    }

    #[test]
    fn test_missing_permissions_reports_denied() {
        let mut gate = MockPermissionGate::new();
        gate.expect_is_granted()
            .returning(|p| !matches!(p, Permission::FineLocation | Permission::CoarseLocation));

        assert_eq!(
            missing_permissions(&gate),
            vec![Permission::FineLocation, Permission::CoarseLocation]
        );
    }
}
