//! Soil/plant sensors that need an explicit write before the measurement
//! can be read.
//!
//! The sensor advertises the `0xFE95` service. Reading it takes two
//! independent exchanges:
//!
//! 1. read the firmware block at [`BATTERY`] (battery percentage first)
//! 2. write [`TRIGGER_COMMAND`] to [`TRIGGER`], then read [`MEASUREMENT`]

use crate::advertisement::short_uuid;
use crate::codec::GattHandle;
use crate::error::DecodeError;

/// Service UUID whose presence in an advertisement identifies a soil sensor.
pub const ADVERTISED_SERVICE: uuid::Uuid = short_uuid(0xFE95);

/// Firmware block (battery + version) at handle `0x38`.
pub const BATTERY: GattHandle = GattHandle {
    handle: 0x38,
    uuid: uuid::Uuid::from_u128(0x0000_1a02_0000_1000_8000_0080_5f9b_34fb),
};

/// Mode register that wakes the measurement block, at handle `0x33`.
pub const TRIGGER: GattHandle = GattHandle {
    handle: 0x33,
    uuid: uuid::Uuid::from_u128(0x0000_1a00_0000_1000_8000_0080_5f9b_34fb),
};

/// Measurement block at handle `0x35`.
pub const MEASUREMENT: GattHandle = GattHandle {
    handle: 0x35,
    uuid: uuid::Uuid::from_u128(0x0000_1a01_0000_1000_8000_0080_5f9b_34fb),
};

/// Bytes written to [`TRIGGER`] to switch the sensor into measurement mode.
pub const TRIGGER_COMMAND: [u8; 2] = [0xA0, 0x1F];

const MEASUREMENT_MIN_LEN: usize = 10;

/// Decoded measurement block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilMeasurement {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Light intensity in lux.
    pub light: u16,
    /// Soil moisture percentage.
    pub moisture: u8,
    /// Soil conductivity in µS/cm.
    pub conductivity: u16,
}

/// Decode the measurement block (little-endian).
///
/// | Bytes | Type | Field |
/// |-------|------|-------|
/// | 0–1 | i16 LE (×0.1 °C) | Temperature |
/// | 2 | — | Padding |
/// | 3–4 | u16 LE (lux) | Light |
/// | 5–6 | — | Unused |
/// | 7 | u8 (%) | Moisture |
/// | 8–9 | u16 LE (µS/cm) | Conductivity |
///
/// Devices usually return 16 bytes; anything past byte 9 is ignored.
///
/// # Errors
///
/// Returns [`DecodeError::TooShort`] when fewer than 10 bytes are present.
pub fn decode_measurement(data: &[u8]) -> Result<SoilMeasurement, DecodeError> {
    if data.len() < MEASUREMENT_MIN_LEN {
        return Err(DecodeError::TooShort {
            format: "soil measurement",
            expected: MEASUREMENT_MIN_LEN,
            actual: data.len(),
        });
    }

    let temp_raw = i16::from_le_bytes([data[0], data[1]]);

    Ok(SoilMeasurement {
        temperature: f64::from(temp_raw) / 10.0,
        light: u16::from_le_bytes([data[3], data[4]]),
        moisture: data[7],
        conductivity: u16::from_le_bytes([data[8], data[9]]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_decode_reference_measurement_block() {
        let data = [0x64, 0x00, 0x00, 0xE8, 0x03, 0x00, 0x00, 0x2A, 0x10, 0x00];
        let m = decode_measurement(&data).unwrap();
        assert!((m.temperature - 10.0).abs() < f64::EPSILON);
        assert_eq!(m.light, 1000);
        assert_eq!(m.moisture, 42);
        assert_eq!(m.conductivity, 16);
    }

    #[test]
    fn should_decode_sixteen_byte_block() {
        let mut data = [0u8; 16];
        // temp: 201 (0x00C9) LE → 20.1 °C
        data[0] = 0xC9;
        // light: 0x41D2 → 16850 lux
        data[3] = 0xD2;
        data[4] = 0x41;
        data[7] = 56;
        // conductivity: 1561 (0x0619)
        data[8] = 0x19;
        data[9] = 0x06;
        let m = decode_measurement(&data).unwrap();
        assert!((m.temperature - 20.1).abs() < 1e-9);
        assert_eq!(m.light, 16_850);
        assert_eq!(m.moisture, 56);
        assert_eq!(m.conductivity, 1561);
    }

    #[test]
    fn should_decode_negative_temperature() {
        let mut data = [0u8; 10];
        // -32 (0xFFE0) LE → -3.2 °C
        data[0] = 0xE0;
        data[1] = 0xFF;
        let m = decode_measurement(&data).unwrap();
        assert!((m.temperature + 3.2).abs() < 1e-9);
    }

    #[test]
    fn should_reject_short_measurement_block() {
        let err = decode_measurement(&[0u8; 9]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TooShort {
                format: "soil measurement",
                expected: 10,
                actual: 9,
            }
        );
    }

    #[test]
    fn should_have_expected_handles() {
        assert_eq!(BATTERY.handle, 0x38);
        assert_eq!(TRIGGER.handle, 0x33);
        assert_eq!(MEASUREMENT.handle, 0x35);
        assert!(MEASUREMENT.uuid.to_string().starts_with("00001a01"));
        assert_eq!(TRIGGER_COMMAND, [0xA0, 0x1F]);
    }
}
