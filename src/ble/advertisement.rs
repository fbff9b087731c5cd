//! Advertisement records and discovered candidate peripherals.

use chrono::{DateTime, Utc};

/// A single advertisement observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Advertisement {
    /// Advertised local name, if the peripheral sent one.
    pub name: Option<String>,
    /// Platform identity of the peripheral (MAC address where available).
    pub address: String,
}

impl Advertisement {
    /// Create a new advertisement record.
    pub fn new(name: Option<impl Into<String>>, address: impl Into<String>) -> Self {
        Self {
            name: name.map(Into::into),
            address: address.into(),
        }
    }

    /// Create an advertisement for a named peripheral.
    pub fn named(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }
}

/// A discovered advertisement accepted by the device filter.
///
/// Candidates are immutable once observed and keyed by `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandidatePeripheral {
    /// Peripheral identity.
    pub address: String,
    /// Advertised name.
    pub name: String,
    /// When the first matching advertisement was seen.
    pub discovered_at: DateTime<Utc>,
}

impl CandidatePeripheral {
    /// Build a candidate from an advertisement, stamped with the current time.
    ///
    /// Returns `None` for unnamed advertisements.
    pub fn from_advertisement(adv: &Advertisement) -> Option<Self> {
        let name = adv.name.clone()?;
        Some(Self {
            address: adv.address.clone(),
            name,
            discovered_at: Utc::now(),
        })
    }

    /// Text shown in device lists: `"<name> - <address>"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.name, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_from_named_advertisement() {
        let adv = Advertisement::named("HM-10-BLE", "AA:BB");
        let candidate = CandidatePeripheral::from_advertisement(&adv).unwrap();
        assert_eq!(candidate.name, "HM-10-BLE");
        assert_eq!(candidate.address, "AA:BB");
        assert_eq!(candidate.label(), "HM-10-BLE - AA:BB");
    }

    #[test]
    fn test_candidate_from_unnamed_advertisement() {
        let adv = Advertisement::new(None::<String>, "AA:BB");
        assert!(CandidatePeripheral::from_advertisement(&adv).is_none());
    }
}
