//! Reading — the accumulator a session fills from one or more decoders.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::address::BleAddress;
use crate::codec::Climate;
use crate::codec::soil::SoilMeasurement;
use crate::family::DeviceFamily;

/// UTC timestamp attached to delivered readings.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Sensor values collected during one acquisition.
///
/// Every field is optional: a reading starts empty and each completed
/// sub-operation fills in the fields it knows about. Only populated fields
/// are serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reading {
    /// Degrees Celsius.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    /// Battery charge in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<u8>,
    /// Light intensity in lux.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<u32>,
    /// Soil moisture percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moisture: Option<u8>,
    /// Soil conductivity in µS/cm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conductivity: Option<u16>,
}

/// The result of one successful sub-operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contribution {
    /// A battery percentage.
    Battery(u8),
    /// Temperature and humidity.
    Climate(Climate),
    /// A full soil measurement block.
    Soil(SoilMeasurement),
}

impl Reading {
    /// Whether no field has been populated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge a sub-operation result into the reading.
    ///
    /// Later contributions overwrite the fields they carry.
    pub fn apply(&mut self, contribution: Contribution) {
        match contribution {
            Contribution::Battery(level) => self.battery = Some(level),
            Contribution::Climate(climate) => {
                self.temperature = Some(climate.temperature);
                self.humidity = Some(climate.humidity);
            }
            Contribution::Soil(soil) => {
                self.temperature = Some(soil.temperature);
                self.light = Some(u32::from(soil.light));
                self.moisture = Some(soil.moisture);
                self.conductivity = Some(soil.conductivity);
            }
        }
    }
}

/// Outbound message for a completed, non-empty reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingMessage {
    /// The populated fields.
    pub payload: Reading,
    /// Address of the device that produced the reading.
    pub address: BleAddress,
    /// Family the device was read as.
    pub family: DeviceFamily,
    /// When the session finalized.
    pub read_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_start_empty() {
        assert!(Reading::default().is_empty());
    }

    #[test]
    fn should_not_be_empty_after_battery() {
        let mut reading = Reading::default();
        reading.apply(Contribution::Battery(87));
        assert!(!reading.is_empty());
        assert_eq!(reading.battery, Some(87));
    }

    #[test]
    fn should_apply_climate_fields() {
        let mut reading = Reading::default();
        reading.apply(Contribution::Climate(Climate {
            temperature: 24.5,
            humidity: 55.0,
        }));
        assert_eq!(reading.temperature, Some(24.5));
        assert_eq!(reading.humidity, Some(55.0));
        assert_eq!(reading.battery, None);
    }

    #[test]
    fn should_apply_soil_fields() {
        let mut reading = Reading::default();
        reading.apply(Contribution::Soil(SoilMeasurement {
            temperature: 10.0,
            light: 1000,
            moisture: 42,
            conductivity: 16,
        }));
        assert_eq!(reading.temperature, Some(10.0));
        assert_eq!(reading.light, Some(1000));
        assert_eq!(reading.moisture, Some(42));
        assert_eq!(reading.conductivity, Some(16));
        assert_eq!(reading.humidity, None);
    }

    #[test]
    fn should_serialize_only_populated_fields() {
        let mut reading = Reading::default();
        reading.apply(Contribution::Battery(69));
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json, serde_json::json!({ "battery": 69 }));
    }

    #[test]
    fn should_serialize_message_with_address_and_family() {
        let mut payload = Reading::default();
        payload.apply(Contribution::Battery(50));
        let message = ReadingMessage {
            payload,
            address: "c4:7c:8d:6a:12:34".parse().unwrap(),
            family: DeviceFamily::SoilSensor,
            read_at: now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["address"], "c4:7c:8d:6a:12:34");
        assert_eq!(json["family"], "soil_sensor");
        assert_eq!(json["payload"]["battery"], 50);
        assert!(json["read_at"].is_string());
    }
}
