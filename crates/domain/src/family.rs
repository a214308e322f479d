//! Device families and the classifier that selects one per session.

use std::fmt;

use serde::Serialize;

use crate::address::BleAddress;
use crate::advertisement::Advertisement;
use crate::codec::soil;

/// The closed set of supported sensor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    /// Temperature/humidity pushed over a GATT notification.
    NotifySensor,
    /// Plant sensor read through a write-then-read exchange.
    SoilSensor,
    /// Everything published in advertisements; never connected.
    BroadcastSensor,
}

impl DeviceFamily {
    /// Whether reading this family requires a GATT connection.
    #[must_use]
    pub fn needs_connection(self) -> bool {
        !matches!(self, Self::BroadcastSensor)
    }

    /// Whether every request must run a fresh scan to obtain data.
    ///
    /// Broadcast sensors only publish values in advertisements, so a cached
    /// peripheral handle is never enough.
    #[must_use]
    pub fn requires_fresh_scan(self) -> bool {
        matches!(self, Self::BroadcastSensor)
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotifySensor => "notify sensor",
            Self::SoilSensor => "soil sensor",
            Self::BroadcastSensor => "broadcast sensor",
        })
    }
}

/// Picks the [`DeviceFamily`] of a discovered peripheral.
///
/// Rules, first match wins:
/// 1. the `0xFE95` service is advertised → [`DeviceFamily::SoilSensor`]
/// 2. the address is a known broadcast device → [`DeviceFamily::BroadcastSensor`]
/// 3. otherwise → [`DeviceFamily::NotifySensor`]
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    broadcast_addresses: Vec<BleAddress>,
}

impl Classifier {
    /// Create a classifier recognising the given broadcast-only devices.
    #[must_use]
    pub fn new(broadcast_addresses: Vec<BleAddress>) -> Self {
        Self {
            broadcast_addresses,
        }
    }

    /// Classify a peripheral from its address and advertisement.
    #[must_use]
    pub fn classify(&self, address: BleAddress, advertisement: &Advertisement) -> DeviceFamily {
        if advertisement.advertises(soil::ADVERTISED_SERVICE) {
            DeviceFamily::SoilSensor
        } else if self.broadcast_addresses.contains(&address) {
            DeviceFamily::BroadcastSensor
        } else {
            DeviceFamily::NotifySensor
        }
    }
}
