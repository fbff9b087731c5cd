//! BLE Service and Characteristic UUIDs.
//!
//! Contains the fixed GATT identifiers exposed by HM-10 serial modules.

use uuid::Uuid;

// HM-10 Serial Service
/// HM-10 serial service UUID.
pub const HM10_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_ffe0_0000_1000_8000_00805f9b34fb);
/// HM-10 serial characteristic UUID (Write, Notify).
pub const HM10_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_ffe1_0000_1000_8000_00805f9b34fb);

// Standard descriptors
/// Client Characteristic Configuration Descriptor UUID.
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// Value written to the CCCD to enable notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Default advertised-name marker of the HM-10 family.
pub const HM10_NAME_MARKER: &str = "HM-10";

/// Check if a service UUID is the HM-10 serial service.
pub fn is_hm10_service(uuid: &Uuid) -> bool {
    *uuid == HM10_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            HM10_SERVICE_UUID.to_string(),
            "0000ffe0-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            HM10_CHARACTERISTIC_UUID.to_string(),
            "0000ffe1-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(CCCD_UUID.to_string(), "00002902-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn test_is_hm10_service() {
        assert!(is_hm10_service(&HM10_SERVICE_UUID));
        assert!(!is_hm10_service(&HM10_CHARACTERISTIC_UUID));
    }

    #[test]
    fn test_enable_notification_value() {
        assert_eq!(ENABLE_NOTIFICATION_VALUE, [0x01, 0x00]);
    }
}
