//! Domain error types.
//!
//! Each decoder reports *why* a payload was rejected so the operator can
//! tell a firmware/format mismatch from a truncated radio frame.

/// An address string that is not six hex octets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid BLE address {input:?}, expected six hex octets like \"c4:7c:8d:6a:12:34\"")]
pub struct AddressParseError {
    input: String,
}

impl AddressParseError {
    pub(crate) fn new(input: &str) -> Self {
        Self {
            input: input.to_owned(),
        }
    }
}

/// Details about why a sensor payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The payload is shorter than the format requires.
    #[error("{format} payload must be at least {expected} bytes, got {actual}")]
    TooShort {
        /// Format name (e.g. "soil measurement").
        format: &'static str,
        /// Minimum byte count.
        expected: usize,
        /// Actual byte count.
        actual: usize,
    },

    /// A tag-length-value event announces more bytes than the block holds.
    #[error("event 0x{event_type:02x} announces {announced} bytes but only {available} remain")]
    Truncated {
        /// The event sub-type byte.
        event_type: u8,
        /// Length announced by the event header.
        announced: usize,
        /// Bytes left in the block.
        available: usize,
    },

    /// A known event sub-type carries fewer bytes than its layout needs.
    #[error("event 0x{event_type:02x} needs {expected} bytes, got {actual}")]
    EventTooShort {
        /// The event sub-type byte.
        event_type: u8,
        /// Bytes required by the layout.
        expected: usize,
        /// Bytes announced by the event header.
        actual: usize,
    },

    /// A textual notification did not match `T=<float> H=<float>`.
    #[error("unrecognised notification text {0:?}")]
    UnrecognisedText(String),
}
