//! Notify-based temperature/humidity sensors.
//!
//! Two hardware variants of the same family coexist. Which one a device is
//! follows from the characteristic UUID that service discovery returns:
//!
//! | Variant | Characteristic | Payload |
//! |---------|----------------|---------|
//! | Text | `226caa55-…` | ASCII `T=24.5 H=55.0` |
//! | Packed | `ebe0ccc1-…` | bytes 0–1 i16 LE (×0.01 °C), byte 4 u8 (%) |

use crate::advertisement::short_uuid;
use crate::codec::{Climate, GattHandle};
use crate::error::DecodeError;

/// Battery level characteristic (`0x2A19`) at handle `0x18`.
pub const BATTERY: GattHandle = GattHandle {
    handle: 0x18,
    uuid: short_uuid(0x2A19),
};

/// Service carrying the textual measurement characteristic.
pub const TEXT_SERVICE: uuid::Uuid = uuid::Uuid::from_u128(0x226c_0000_6476_4566_7562_6673_4470_666d);

/// Characteristic notifying `T=<float> H=<float>` strings.
pub const TEXT_CHAR: uuid::Uuid = uuid::Uuid::from_u128(0x226c_aa55_6476_4566_7562_6673_4470_666d);

/// Service carrying the packed measurement characteristic.
pub const PACKED_SERVICE: uuid::Uuid =
    uuid::Uuid::from_u128(0xebe0_ccb0_7a0a_4b0c_8a1a_6ff2_997d_a3a6);

/// Characteristic notifying the packed binary measurement.
pub const PACKED_CHAR: uuid::Uuid = uuid::Uuid::from_u128(0xebe0_ccc1_7a0a_4b0c_8a1a_6ff2_997d_a3a6);

/// Services to discover when looking for a measurement characteristic.
pub const SERVICES: [uuid::Uuid; 2] = [TEXT_SERVICE, PACKED_SERVICE];

/// Measurement characteristics, in preference order.
pub const CHARACTERISTICS: [uuid::Uuid; 2] = [TEXT_CHAR, PACKED_CHAR];

const PACKED_MIN_LEN: usize = 5;

/// How a notification payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEncoding {
    /// ASCII `T=<float> H=<float>`.
    Text,
    /// Little-endian binary frame.
    Packed,
}

impl NotifyEncoding {
    /// Select the encoding implied by a discovered characteristic UUID.
    #[must_use]
    pub fn from_characteristic(uuid: uuid::Uuid) -> Option<Self> {
        match uuid {
            TEXT_CHAR => Some(Self::Text),
            PACKED_CHAR => Some(Self::Packed),
            _ => None,
        }
    }

    /// Decode a notification payload with this encoding.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the payload does not match the encoding.
    pub fn decode(self, data: &[u8]) -> Result<Climate, DecodeError> {
        match self {
            Self::Text => parse_text(data),
            Self::Packed => parse_packed(data),
        }
    }
}

/// Parse a textual `T=<float> H=<float>` notification.
///
/// The pattern may appear anywhere in the payload (devices append a NUL or
/// other trailing bytes). Both numbers must carry a decimal point.
///
/// # Errors
///
/// Returns [`DecodeError::UnrecognisedText`] when the pattern is absent.
pub fn parse_text(data: &[u8]) -> Result<Climate, DecodeError> {
    let text = String::from_utf8_lossy(data);
    let unrecognised = || DecodeError::UnrecognisedText(text.trim_end_matches('\0').to_owned());

    let mut search = text.as_ref();
    while let Some(pos) = search.find("T=") {
        let candidate = &search[pos + 2..];
        if let Some(climate) = parse_text_at(candidate) {
            return Ok(climate);
        }
        search = candidate;
    }

    Err(unrecognised())
}

/// Try to read `<float> H=<float>` at the start of `input`.
fn parse_text_at(input: &str) -> Option<Climate> {
    let (temperature, rest) = take_decimal(input)?;
    let rest = rest.strip_prefix(" H=")?;
    let (humidity, _) = take_decimal(rest)?;
    Some(Climate {
        temperature,
        humidity,
    })
}

/// Consume an optionally signed `digits.digits` number from the front of `input`.
fn take_decimal(input: &str) -> Option<(f64, &str)> {
    let unsigned = input.strip_prefix('-').unwrap_or(input);
    let sign_len = input.len() - unsigned.len();

    let int_len = unsigned.bytes().take_while(u8::is_ascii_digit).count();
    if int_len == 0 {
        return None;
    }
    let after_int = &unsigned[int_len..];
    let fraction = after_int.strip_prefix('.')?;
    let frac_len = fraction.bytes().take_while(u8::is_ascii_digit).count();
    if frac_len == 0 {
        return None;
    }

    let end = sign_len + int_len + 1 + frac_len;
    let value = input[..end].parse().ok()?;
    Some((value, &input[end..]))
}

/// Parse a packed binary notification.
///
/// | Bytes | Type | Field |
/// |-------|------|-------|
/// | 0–1 | i16 LE (×0.01 °C) | Temperature |
/// | 2–3 | — | Unused |
/// | 4 | u8 (%) | Humidity |
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] when fewer than 5 bytes are present.
pub fn parse_packed(data: &[u8]) -> Result<Climate, DecodeError> {
    if data.len() < PACKED_MIN_LEN {
        return Err(DecodeError::TooShort {
            format: "packed notification",
            expected: PACKED_MIN_LEN,
            actual: data.len(),
        });
    }

    let temp_raw = i16::from_le_bytes([data[0], data[1]]);

    Ok(Climate {
        temperature: f64::from(temp_raw) / 100.0,
        humidity: f64::from(data[4]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_text_notification() {
        let climate = parse_text(b"T=24.5 H=55.0").unwrap();
        assert!((climate.temperature - 24.5).abs() < f64::EPSILON);
        assert!((climate.humidity - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_parse_text_with_trailing_nul() {
        let climate = parse_text(b"T=21.9 H=48.3\0").unwrap();
        assert!((climate.temperature - 21.9).abs() < 1e-9);
        assert!((climate.humidity - 48.3).abs() < 1e-9);
    }

    #[test]
    fn should_parse_text_with_leading_noise() {
        let climate = parse_text(b"xxT=1 T=20.0 H=30.5").unwrap();
        assert!((climate.temperature - 20.0).abs() < 1e-9);
        assert!((climate.humidity - 30.5).abs() < 1e-9);
    }

    #[test]
    fn should_parse_text_with_negative_temperature() {
        let climate = parse_text(b"T=-3.2 H=80.0").unwrap();
        assert!((climate.temperature + 3.2).abs() < 1e-9);
    }

    #[test]
    fn should_reject_text_without_decimal_point() {
        let err = parse_text(b"T=24 H=55").unwrap_err();
        assert_eq!(err, DecodeError::UnrecognisedText("T=24 H=55".to_owned()));
    }

    #[test]
    fn should_reject_text_missing_humidity() {
        assert!(parse_text(b"T=24.5").is_err());
    }

    #[test]
    fn should_reject_binary_garbage_as_text() {
        assert!(parse_text(&[0xC9, 0x00, 0xFF, 0x12]).is_err());
    }

    #[test]
    fn should_parse_packed_notification() {
        // 2450 (0x0992) LE → 24.50 °C, humidity 55 %
        let data = [0x92, 0x09, 0x00, 0x00, 0x37];
        let climate = parse_packed(&data).unwrap();
        assert!((climate.temperature - 24.5).abs() < 1e-9);
        assert!((climate.humidity - 55.0).abs() < 1e-9);
    }

    #[test]
    fn should_parse_packed_negative_temperature() {
        // -550 = 0xFDDA LE → -5.50 °C
        let data = [0xDA, 0xFD, 0x00, 0x00, 0x10];
        let climate = parse_packed(&data).unwrap();
        assert!((climate.temperature + 5.5).abs() < 1e-9);
        assert!((climate.humidity - 16.0).abs() < 1e-9);
    }

    #[test]
    fn should_reject_short_packed_notification() {
        let err = parse_packed(&[0x92, 0x09, 0x37]).unwrap_err();
        assert!(err.to_string().contains("at least 5 bytes"));
    }

    #[test]
    fn should_select_encoding_from_characteristic() {
        assert_eq!(
            NotifyEncoding::from_characteristic(TEXT_CHAR),
            Some(NotifyEncoding::Text)
        );
        assert_eq!(
            NotifyEncoding::from_characteristic(PACKED_CHAR),
            Some(NotifyEncoding::Packed)
        );
        assert_eq!(NotifyEncoding::from_characteristic(TEXT_SERVICE), None);
    }

    #[test]
    fn should_not_cross_decode_between_encodings() {
        assert!(NotifyEncoding::Text.decode(&[0x92, 0x09, 0x00, 0x00, 0x37]).is_err());
        let packed = NotifyEncoding::Packed.decode(b"T=24.5 H=55.0").unwrap();
        // the same bytes mean something else in the packed layout
        assert!((packed.temperature - 24.5).abs() > 1.0);
    }

    #[test]
    fn should_have_expected_uuids() {
        assert_eq!(TEXT_CHAR.to_string(), "226caa55-6476-4566-7562-66734470666d");
        assert_eq!(PACKED_CHAR.to_string(), "ebe0ccc1-7a0a-4b0c-8a1a-6ff2997da3a6");
        assert_eq!(BATTERY.handle, 0x18);
    }
}
