//! Virtual sensors — what a simulated peripheral advertises and answers.

use std::collections::HashMap;
use std::time::Duration;

use blepoll_domain::address::BleAddress;
use blepoll_domain::advertisement::Advertisement;
use blepoll_domain::codec::{broadcast, notify, soil};

/// Faults injected into a virtual sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// Refuse every connection attempt.
    pub refuse_connect: bool,
    /// Fail every write.
    pub fail_writes: bool,
    /// Handles whose reads fail.
    pub failing_reads: Vec<u16>,
    /// Drop the connection this long after connecting.
    pub disconnect_after: Option<Duration>,
}

/// Script of a simulated peripheral.
///
/// Start from a preset ([`mijia_text`](Self::mijia_text),
/// [`mijia_packed`](Self::mijia_packed), [`flora`](Self::flora),
/// [`cleargrass`](Self::cleargrass)) and adjust it with the `with_*`
/// builders.
#[derive(Debug, Clone)]
pub struct VirtualSensor {
    /// Device address.
    pub address: BleAddress,
    /// Advertisement reported while scanning.
    pub advertisement: Advertisement,
    /// Delay before the first discovery report of a scan.
    pub first_seen_after: Duration,
    /// Interval between repeated reports and follow-up advertisements.
    pub advertise_every: Duration,
    /// Latency of every read and write.
    pub io_delay: Duration,
    /// Attribute values by handle.
    pub reads: HashMap<u16, Vec<u8>>,
    /// Characteristics exposed to discovery.
    pub characteristics: Vec<uuid::Uuid>,
    /// Notification payloads sent after subscribing; empty means silent.
    pub notifications: Vec<Vec<u8>>,
    /// Delay before each notification.
    pub notify_after: Duration,
    /// Advertisements emitted after discovery, in order.
    pub later_advertisements: Vec<Advertisement>,
    /// Injected faults.
    pub faults: Faults,
}

impl VirtualSensor {
    fn blank(address: BleAddress, local_name: &str) -> Self {
        Self {
            address,
            advertisement: Advertisement {
                local_name: Some(local_name.to_owned()),
                rssi: Some(-60),
                ..Advertisement::default()
            },
            first_seen_after: Duration::from_millis(500),
            advertise_every: Duration::from_secs(1),
            io_delay: Duration::from_millis(50),
            reads: HashMap::new(),
            characteristics: Vec::new(),
            notifications: Vec::new(),
            notify_after: Duration::from_millis(200),
            later_advertisements: Vec::new(),
            faults: Faults::default(),
        }
    }

    /// Temperature/humidity sensor notifying `T=24.5 H=55.0` as text.
    #[must_use]
    pub fn mijia_text(address: BleAddress) -> Self {
        let mut sensor = Self::blank(address, "MJ_HT_V1");
        sensor.reads.insert(notify::BATTERY.handle, vec![87]);
        sensor.characteristics.push(notify::TEXT_CHAR);
        sensor.notifications.push(b"T=24.5 H=55.0\0".to_vec());
        sensor
    }

    /// Temperature/humidity sensor notifying a packed binary frame
    /// (24.5 °C, 55 %).
    #[must_use]
    pub fn mijia_packed(address: BleAddress) -> Self {
        let mut sensor = Self::blank(address, "LYWSD03MMC");
        sensor.reads.insert(notify::BATTERY.handle, vec![75]);
        sensor.characteristics.push(notify::PACKED_CHAR);
        sensor
            .notifications
            .push(vec![0x92, 0x09, 0x37, 0x0c, 0x37]);
        sensor
    }

    /// Soil sensor: 69 % battery, 10.0 °C, 1000 lx, 42 % moisture,
    /// 16 µS/cm.
    #[must_use]
    pub fn flora(address: BleAddress) -> Self {
        let mut sensor = Self::blank(address, "Flower care");
        sensor.advertisement.services.push(soil::ADVERTISED_SERVICE);
        sensor.reads.insert(
            soil::BATTERY.handle,
            vec![0x45, 0x13, b'3', b'.', b'1', b'.', b'8'],
        );
        sensor.reads.insert(
            soil::MEASUREMENT.handle,
            vec![0x64, 0x00, 0x00, 0xE8, 0x03, 0x00, 0x00, 0x2A, 0x10, 0x00],
        );
        sensor
    }

    /// Broadcast-only sensor advertising 24.5 °C, 73 % and 69 % battery in
    /// one block.
    #[must_use]
    pub fn cleargrass(address: BleAddress) -> Self {
        let mut sensor = Self::blank(address, "ClearGrass Temp & RH");
        sensor.advertisement.service_data.insert(
            broadcast::SERVICE_DATA_TAG,
            broadcast_block(address, Some((245, 730)), Some(69)),
        );
        sensor
    }

    /// Replace the advertisement reported while scanning.
    #[must_use]
    pub fn with_advertisement(mut self, advertisement: Advertisement) -> Self {
        self.advertisement = advertisement;
        self
    }

    /// Queue an advertisement emitted after discovery.
    #[must_use]
    pub fn with_later_advertisement(mut self, advertisement: Advertisement) -> Self {
        self.later_advertisements.push(advertisement);
        self
    }

    /// Set the value returned for `handle`.
    #[must_use]
    pub fn with_read(mut self, handle: u16, data: &[u8]) -> Self {
        self.reads.insert(handle, data.to_vec());
        self
    }

    /// Replace the notification script.
    #[must_use]
    pub fn with_notifications(mut self, payloads: Vec<Vec<u8>>) -> Self {
        self.notifications = payloads;
        self
    }

    /// Never notify.
    #[must_use]
    pub fn silent(self) -> Self {
        self.with_notifications(Vec::new())
    }

    /// Only show up in scans after `delay`.
    #[must_use]
    pub fn first_seen_after(mut self, delay: Duration) -> Self {
        self.first_seen_after = delay;
        self
    }

    /// Set the read/write latency.
    #[must_use]
    pub fn with_io_delay(mut self, delay: Duration) -> Self {
        self.io_delay = delay;
        self
    }

    /// Refuse connections.
    #[must_use]
    pub fn refusing_connections(mut self) -> Self {
        self.faults.refuse_connect = true;
        self
    }

    /// Fail writes.
    #[must_use]
    pub fn with_failing_writes(mut self) -> Self {
        self.faults.fail_writes = true;
        self
    }

    /// Fail reads of `handle`.
    #[must_use]
    pub fn with_failing_read(mut self, handle: u16) -> Self {
        self.faults.failing_reads.push(handle);
        self
    }

    /// Drop the connection `delay` after connecting.
    #[must_use]
    pub fn disconnecting_after(mut self, delay: Duration) -> Self {
        self.faults.disconnect_after = Some(delay);
        self
    }

    /// Whether the advertisement matches a service filter.
    pub(crate) fn matches_filter(&self, services: &[uuid::Uuid]) -> bool {
        services.is_empty()
            || services.iter().any(|service| {
                self.advertisement.advertises(*service)
                    || self.advertisement.service_data.contains_key(service)
            })
    }
}

/// Build a `0xFDCD` broadcast block for `address`.
///
/// `climate` is `(temperature, humidity)` in tenths; either event may be
/// left out to simulate a partial broadcast.
#[must_use]
pub fn broadcast_block(
    address: BleAddress,
    climate: Option<(i16, u16)>,
    battery: Option<u8>,
) -> Vec<u8> {
    let mut block = vec![0x08, 0x07];
    block.extend(address.octets().iter().rev());
    if let Some((temperature, humidity)) = climate {
        block.extend([0x01, 0x04]);
        block.extend(temperature.to_le_bytes());
        block.extend(humidity.to_le_bytes());
    }
    if let Some(level) = battery {
        block.extend([0x02, 0x01, level]);
    }
    block
}

/// An advertisement carrying only a broadcast block.
#[must_use]
pub fn broadcast_advertisement(block: Vec<u8>) -> Advertisement {
    let mut advertisement = Advertisement::default();
    advertisement
        .service_data
        .insert(broadcast::SERVICE_DATA_TAG, block);
    advertisement
}

#[cfg(test)]
mod tests {
    use blepoll_domain::codec::Climate;

    use super::*;

    fn cleargrass_address() -> BleAddress {
        "58:2d:34:10:b2:9b".parse().unwrap()
    }

    #[test]
    fn should_build_reference_broadcast_block() {
        let block = broadcast_block(cleargrass_address(), Some((245, 730)), Some(69));
        let expected = [
            0x08, 0x07, 0x9b, 0xb2, 0x10, 0x34, 0x2d, 0x58, 0x01, 0x04, 0xf5, 0x00, 0xda, 0x02,
            0x02, 0x01, 0x45,
        ];
        assert_eq!(block, expected);
    }

    #[test]
    fn should_advertise_decodable_broadcast_block() {
        let sensor = VirtualSensor::cleargrass(cleargrass_address());
        let frame = broadcast::decode_advertisement(&sensor.advertisement)
            .unwrap()
            .unwrap();
        assert_eq!(frame.mac, cleargrass_address().octets());
        assert_eq!(
            frame.climate(),
            Some(Climate {
                temperature: 24.5,
                humidity: 73.0
            })
        );
        assert_eq!(frame.battery(), Some(69));
    }

    #[test]
    fn should_advertise_soil_service_for_flora() {
        let sensor = VirtualSensor::flora(BleAddress::default());
        assert!(sensor.advertisement.advertises(soil::ADVERTISED_SERVICE));
        assert!(sensor.matches_filter(&[soil::ADVERTISED_SERVICE]));
        assert!(!sensor.matches_filter(&[broadcast::SERVICE_DATA_TAG]));
    }

    #[test]
    fn should_match_empty_filter() {
        assert!(VirtualSensor::mijia_text(BleAddress::default()).matches_filter(&[]));
    }

    #[test]
    fn should_decode_packed_preset() {
        let sensor = VirtualSensor::mijia_packed(BleAddress::default());
        let climate = notify::NotifyEncoding::Packed
            .decode(&sensor.notifications[0])
            .unwrap();
        assert!((climate.temperature - 24.5).abs() < f64::EPSILON);
        assert!((climate.humidity - 55.0).abs() < f64::EPSILON);
    }
}
