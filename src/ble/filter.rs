//! Device filtering for scan results.

use crate::ble::advertisement::Advertisement;
use crate::ble::uuids::HM10_NAME_MARKER;

/// Decides whether an advertisement belongs to a candidate peripheral.
///
/// An advertisement matches when its name is present and contains the
/// marker, ignoring case. Unnamed advertisements never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Lowercased marker.
    marker: String,
}

impl DeviceFilter {
    /// Create a filter for the given name marker.
    pub fn new(marker: impl AsRef<str>) -> Self {
        Self {
            marker: marker.as_ref().to_lowercase(),
        }
    }

    /// The (lowercased) marker this filter looks for.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Check an advertisement against the filter.
    pub fn matches(&self, adv: &Advertisement) -> bool {
        match &adv.name {
            Some(name) => name.to_lowercase().contains(&self.marker),
            None => false,
        }
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::new(HM10_NAME_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_marker() {
        let filter = DeviceFilter::default();
        assert_eq!(filter.marker(), "hm-10");
        assert!(filter.matches(&Advertisement::named("HM-10-BLE", "AA:BB")));
        assert!(filter.matches(&Advertisement::named("my hm-10", "AA:BB")));
        assert!(!filter.matches(&Advertisement::named("HM-11", "AA:BB")));
    }

    #[test]
    fn test_unnamed_rejected() {
        let filter = DeviceFilter::default();
        assert!(!filter.matches(&Advertisement::new(None::<String>, "AA:BB")));
    }

    proptest! {
        #[test]
        fn prop_unnamed_never_matches(marker in ".{0,8}", address in "[0-9A-F:]{2,17}") {
            let filter = DeviceFilter::new(&marker);
            prop_assert!(!filter.matches(&Advertisement::new(None::<String>, address)));
        }

        #[test]
        fn prop_marker_in_name_matches(
            prefix in "[a-z0-9 ]{0,6}",
            marker in "[a-zA-Z0-9-]{1,6}",
            suffix in "[a-z0-9 ]{0,6}",
        ) {
            let name = format!("{}{}{}", prefix, marker.to_uppercase(), suffix);
            let filter = DeviceFilter::new(marker.to_lowercase());
            prop_assert!(filter.matches(&Advertisement::named(name, "AA:BB")));
        }

        #[test]
        fn prop_missing_marker_rejected(name in "[a-z ]{0,12}") {
            // Names drawn without digits can never contain "hm-10".
            let filter = DeviceFilter::default();
            prop_assert!(!filter.matches(&Advertisement::named(name, "AA:BB")));
        }
    }
}
