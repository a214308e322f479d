//! Bluetooth device addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AddressParseError;

/// A 48-bit Bluetooth device address.
///
/// Parsing accepts `:` or `-` separators in any letter case; the display
/// form is always lowercase and colon-separated (`"c4:7c:8d:6a:12:34"`), so
/// two addresses compare equal regardless of how the operator typed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BleAddress([u8; 6]);

impl BleAddress {
    /// Wrap raw address bytes, most significant first.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Access the raw address bytes.
    #[must_use]
    pub const fn octets(self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for BleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for BleAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut bytes = [0u8; 6];
        let mut parts = trimmed.split([':', '-']);

        for slot in &mut bytes {
            let part = parts
                .next()
                .ok_or_else(|| AddressParseError::new(trimmed))?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(AddressParseError::new(trimmed));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| AddressParseError::new(trimmed))?;
        }

        if parts.next().is_some() {
            return Err(AddressParseError::new(trimmed));
        }

        Ok(Self(bytes))
    }
}

impl Serialize for BleAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BleAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
