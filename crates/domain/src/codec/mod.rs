//! Sensor payload decoders, one per device family.
//!
//! Pure functions operating on raw `&[u8]` slices; no BLE dependency needed.
//! The session layer decides *which* bytes to fetch; these modules only turn
//! them into typed fields.
//!
//! - [`notify`] — temperature/humidity pushed over a GATT notification
//!   (textual or packed encoding)
//! - [`soil`] — plant sensor measurement block read after a trigger write
//! - [`broadcast`] — temperature/humidity/battery events carried in
//!   advertisement service data

pub mod broadcast;
pub mod notify;
pub mod soil;

use crate::error::DecodeError;

/// A GATT attribute addressed both by its ATT handle and its UUID.
///
/// Radios that expose raw handle I/O use `handle`; radios that only work at
/// the characteristic level resolve `uuid` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattHandle {
    /// ATT attribute handle.
    pub handle: u16,
    /// Characteristic UUID behind that handle.
    pub uuid: uuid::Uuid,
}

/// Temperature and relative humidity pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
}

/// Decode a battery read: the first byte is the charge percentage.
///
/// Both the notify family (battery level characteristic) and the soil family
/// (firmware block, battery first) use this layout.
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] on an empty payload.
pub fn decode_battery(data: &[u8]) -> Result<u8, DecodeError> {
    data.first().copied().ok_or(DecodeError::TooShort {
        format: "battery",
        expected: 1,
        actual: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_decode_battery_from_first_byte() {
        assert_eq!(decode_battery(&[0x63]).unwrap(), 99);
    }

    #[test]
    fn should_ignore_trailing_firmware_bytes() {
        let firmware = [0x45, 0x13, b'3', b'.', b'1', b'.', b'8'];
        assert_eq!(decode_battery(&firmware).unwrap(), 69);
    }

    #[test]
    fn should_decode_full_range_battery_byte() {
        assert_eq!(decode_battery(&[0xFF]).unwrap(), 255);
    }

    #[test]
    fn should_reject_empty_battery_payload() {
        let err = decode_battery(&[]).unwrap_err();
        assert!(err.to_string().contains("at least 1 bytes"));
    }
}
