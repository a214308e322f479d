//! Sensors that publish everything in advertisement service data.
//!
//! The block lives under the 16-bit service-data tag `0xFDCD`:
//!
//! ```text
//! 08 07 | 45 38 10 34 2d 58 | 01 04 f5 00 da 02 | 02 01 45
//! hdr   | MAC (reversed)    | T+H event         | battery event
//! ```
//!
//! After the 8-byte header, the block is a sequence of
//! `type (u8), length (u8), value` events. A single broadcast may carry only
//! some of the event types, so a full reading can span several
//! advertisements.

use crate::advertisement::{Advertisement, short_uuid};
use crate::codec::Climate;
use crate::error::DecodeError;

/// Service-data tag identifying the broadcast block.
pub const SERVICE_DATA_TAG: uuid::Uuid = short_uuid(0xFDCD);

const HEADER_LEN: usize = 8;
const MAC_OFFSET: usize = 2;

const EVENT_CLIMATE: u8 = 0x01;
const EVENT_BATTERY: u8 = 0x02;

const CLIMATE_LEN: usize = 4;
const BATTERY_LEN: usize = 1;

/// One decoded event from the broadcast block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BroadcastEvent {
    /// Temperature + humidity (sub-type `0x01`).
    Climate(Climate),
    /// Battery percentage (sub-type `0x02`).
    Battery(u8),
}

/// A decoded broadcast block.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastFrame {
    /// Device MAC, most significant byte first.
    pub mac: [u8; 6],
    /// Events carried by this block, in payload order.
    pub events: Vec<BroadcastEvent>,
}

impl BroadcastFrame {
    /// The temperature/humidity event, if this frame carries one.
    #[must_use]
    pub fn climate(&self) -> Option<Climate> {
        self.events.iter().find_map(|event| match event {
            BroadcastEvent::Climate(climate) => Some(*climate),
            BroadcastEvent::Battery(_) => None,
        })
    }

    /// The battery event, if this frame carries one.
    #[must_use]
    pub fn battery(&self) -> Option<u8> {
        self.events.iter().find_map(|event| match event {
            BroadcastEvent::Battery(level) => Some(*level),
            BroadcastEvent::Climate(_) => None,
        })
    }
}

/// Decode the broadcast block of an advertisement, if it carries one.
///
/// Returns `Ok(None)` when the advertisement has no `0xFDCD` service data.
///
/// # Errors
///
/// Returns [`DecodeError`] when the block is present but malformed.
pub fn decode_advertisement(adv: &Advertisement) -> Result<Option<BroadcastFrame>, DecodeError> {
    adv.service_data_for(SERVICE_DATA_TAG)
        .map(decode_block)
        .transpose()
}

/// Decode a raw `0xFDCD` service-data block.
///
/// Unknown event types are skipped using their length byte.
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] when the header is incomplete,
/// [`DecodeError::Truncated`] when an event overruns the block and
/// [`DecodeError::EventTooShort`] when a known event is undersized.
pub fn decode_block(data: &[u8]) -> Result<BroadcastFrame, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::TooShort {
            format: "broadcast block",
            expected: HEADER_LEN,
            actual: data.len(),
        });
    }

    let raw_mac = &data[MAC_OFFSET..MAC_OFFSET + 6];
    let mac = [
        raw_mac[5], raw_mac[4], raw_mac[3], raw_mac[2], raw_mac[1], raw_mac[0],
    ];

    let mut events = Vec::new();
    let mut rest = &data[HEADER_LEN..];

    while let [event_type, len, tail @ ..] = rest {
        let len = usize::from(*len);
        if tail.len() < len {
            return Err(DecodeError::Truncated {
                event_type: *event_type,
                announced: len,
                available: tail.len(),
            });
        }
        let (value, next) = tail.split_at(len);

        match *event_type {
            EVENT_CLIMATE => events.push(BroadcastEvent::Climate(decode_climate(value)?)),
            EVENT_BATTERY => {
                let level = value.first().copied().ok_or(DecodeError::EventTooShort {
                    event_type: EVENT_BATTERY,
                    expected: BATTERY_LEN,
                    actual: 0,
                })?;
                events.push(BroadcastEvent::Battery(level));
            }
            _ => {}
        }

        rest = next;
    }

    Ok(BroadcastFrame { mac, events })
}

fn decode_climate(value: &[u8]) -> Result<Climate, DecodeError> {
    if value.len() < CLIMATE_LEN {
        return Err(DecodeError::EventTooShort {
            event_type: EVENT_CLIMATE,
            expected: CLIMATE_LEN,
            actual: value.len(),
        });
    }

    let temp_raw = i16::from_le_bytes([value[0], value[1]]);
    let hum_raw = u16::from_le_bytes([value[2], value[3]]);

    Ok(Climate {
        temperature: f64::from(temp_raw) / 10.0,
        humidity: f64::from(hum_raw) / 10.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0807453810342d580104f500da02020145
    const REFERENCE: [u8; 17] = [
        0x08, 0x07, 0x45, 0x38, 0x10, 0x34, 0x2d, 0x58, 0x01, 0x04, 0xf5, 0x00, 0xda, 0x02, 0x02,
        0x01, 0x45,
    ];

    #[test]
    fn should_decode_reference_block() {
        let frame = decode_block(&REFERENCE).unwrap();
        let climate = frame.climate().unwrap();
        assert!((climate.temperature - 24.5).abs() < 1e-9);
        assert!((climate.humidity - 73.0).abs() < 1e-9);
        assert_eq!(frame.battery(), Some(69));
    }

    #[test]
    fn should_extract_reversed_mac() {
        let frame = decode_block(&REFERENCE).unwrap();
        assert_eq!(frame.mac, [0x58, 0x2d, 0x34, 0x10, 0x38, 0x45]);
    }

    #[test]
    fn should_decode_block_with_only_battery_event() {
        let data = [0x08, 0x07, 0, 0, 0, 0, 0, 0, 0x02, 0x01, 0x64];
        let frame = decode_block(&data).unwrap();
        assert_eq!(frame.climate(), None);
        assert_eq!(frame.battery(), Some(100));
    }

    #[test]
    fn should_decode_negative_temperature() {
        // -32 (0xFFE0) → -3.2 °C, humidity 500 → 50.0 %
        let data = [0x08, 0x07, 0, 0, 0, 0, 0, 0, 0x01, 0x04, 0xE0, 0xFF, 0xF4, 0x01];
        let climate = decode_block(&data).unwrap().climate().unwrap();
        assert!((climate.temperature + 3.2).abs() < 1e-9);
        assert!((climate.humidity - 50.0).abs() < 1e-9);
    }

    #[test]
    fn should_skip_unknown_event_types() {
        let data = [
            0x08, 0x07, 0, 0, 0, 0, 0, 0, 0x0F, 0x02, 0xAA, 0xBB, 0x02, 0x01, 0x30,
        ];
        let frame = decode_block(&data).unwrap();
        assert_eq!(frame.events, vec![BroadcastEvent::Battery(0x30)]);
    }

    #[test]
    fn should_reject_truncated_event() {
        let data = [0x08, 0x07, 0, 0, 0, 0, 0, 0, 0x01, 0x04, 0xF5, 0x00];
        let err = decode_block(&data).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                event_type: 0x01,
                announced: 4,
                available: 2,
            }
        );
    }

    #[test]
    fn should_reject_undersized_climate_event() {
        let data = [0x08, 0x07, 0, 0, 0, 0, 0, 0, 0x01, 0x02, 0xF5, 0x00];
        assert!(matches!(
            decode_block(&data),
            Err(DecodeError::EventTooShort { event_type: 0x01, .. })
        ));
    }

    #[test]
    fn should_reject_short_header() {
        assert!(matches!(
            decode_block(&[0x08, 0x07, 0x45]),
            Err(DecodeError::TooShort { .. })
        ));
    }

    #[test]
    fn should_return_none_without_service_data_tag() {
        let adv = Advertisement::default();
        assert_eq!(decode_advertisement(&adv).unwrap(), None);
    }

    #[test]
    fn should_decode_block_from_advertisement() {
        let mut adv = Advertisement::default();
        adv.service_data.insert(SERVICE_DATA_TAG, REFERENCE.to_vec());
        let frame = decode_advertisement(&adv).unwrap().unwrap();
        assert_eq!(frame.battery(), Some(69));
    }
}
