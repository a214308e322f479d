//! Inbound poll requests.

use serde::Deserialize;

/// One inbound request to poll a device.
///
/// Both fields are optional: an empty request polls the configured default
/// address and reuses the cached peripheral when possible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Request {
    /// Address to poll; falls back to the configured default when absent.
    pub address: Option<String>,
    /// Drop the cached peripheral and scan again.
    #[serde(alias = "forceScan")]
    pub scan: bool,
}

impl Request {
    /// A request for an explicit address.
    #[must_use]
    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            scan: false,
        }
    }

    /// Ask for a fresh scan.
    #[must_use]
    pub fn with_scan(mut self) -> Self {
        self.scan = true;
        self
    }

    /// The requested address, ignoring empty strings.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }
}
