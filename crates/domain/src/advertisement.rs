//! Advertisement snapshots captured during discovery.

use std::collections::HashMap;

use serde::Serialize;

/// Build a full 128-bit UUID from a 16-bit Bluetooth SIG short UUID.
#[must_use]
pub const fn short_uuid(short: u16) -> uuid::Uuid {
    // Bluetooth base UUID 0000xxxx-0000-1000-8000-00805f9b34fb
    uuid::Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

/// What a peripheral broadcast about itself, as seen by the scanner.
///
/// The snapshot is immutable: a later advertisement produces a new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Advertisement {
    /// Advertised local name, if any.
    pub local_name: Option<String>,
    /// Advertised service UUIDs.
    pub services: Vec<uuid::Uuid>,
    /// Service-data blocks keyed by service UUID.
    pub service_data: HashMap<uuid::Uuid, Vec<u8>>,
    /// Received signal strength, when the radio reports it.
    pub rssi: Option<i16>,
}

impl Advertisement {
    /// Whether the given service UUID is advertised.
    #[must_use]
    pub fn advertises(&self, service: uuid::Uuid) -> bool {
        self.services.contains(&service)
    }

    /// The service-data block published under `service`, if present.
    #[must_use]
    pub fn service_data_for(&self, service: uuid::Uuid) -> Option<&[u8]> {
        self.service_data.get(&service).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_expand_short_uuid_onto_base_uuid() {
        assert_eq!(
            short_uuid(0xFE95).to_string(),
            "0000fe95-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            short_uuid(0x2A19).to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn should_report_advertised_services() {
        let adv = Advertisement {
            services: vec![short_uuid(0xFE95)],
            ..Advertisement::default()
        };
        assert!(adv.advertises(short_uuid(0xFE95)));
        assert!(!adv.advertises(short_uuid(0xFDCD)));
    }

    #[test]
    fn should_look_up_service_data_by_uuid() {
        let mut adv = Advertisement::default();
        adv.service_data.insert(short_uuid(0xFDCD), vec![1, 2, 3]);
        assert_eq!(adv.service_data_for(short_uuid(0xFDCD)), Some(&[1, 2, 3][..]));
        assert_eq!(adv.service_data_for(short_uuid(0x181A)), None);
    }
}
