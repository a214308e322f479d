//! Recovering the device address from what a platform reports.
//!
//! CoreBluetooth hides hardware addresses behind random identifiers, so the
//! reported address may be all zeroes. Both the broadcast block and the
//! MiBeacon frame of the soil sensor carry the real MAC; fall back to them.

use blepoll_domain::address::BleAddress;
use blepoll_domain::advertisement::Advertisement;
use blepoll_domain::codec::{broadcast, soil};

/// MiBeacon frames carry the MAC reversed at this offset.
const MIBEACON_MAC_OFFSET: usize = 7;

/// The address of a peripheral, recovered from its advertisement when the
/// platform does not expose it.
pub(crate) fn resolve(reported: [u8; 6], advertisement: &Advertisement) -> BleAddress {
    if reported != [0; 6] {
        return BleAddress::new(reported);
    }
    if let Ok(Some(frame)) = broadcast::decode_advertisement(advertisement) {
        return BleAddress::new(frame.mac);
    }
    advertisement
        .service_data_for(soil::ADVERTISED_SERVICE)
        .and_then(mibeacon_mac)
        .map_or_else(|| BleAddress::new(reported), BleAddress::new)
}

fn mibeacon_mac(data: &[u8]) -> Option<[u8; 6]> {
    let raw = data.get(MIBEACON_MAC_OFFSET..MIBEACON_MAC_OFFSET + 6)?;
    Some([raw[5], raw[4], raw[3], raw[2], raw[1], raw[0]])
}
