//! Acquisition error taxonomy and its mapping to status updates.

use std::fmt;

use blepoll_domain::address::BleAddress;
use blepoll_domain::error::{AddressParseError, DecodeError};
use blepoll_domain::status::{Severity, Status};

use crate::ports::{RadioError, RadioState};

/// Which gate flag rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyKind {
    /// A discovery window is already open.
    Scanning,
    /// An acquisition session is already in flight.
    Requesting,
}

impl fmt::Display for BusyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scanning => "searching",
            Self::Requesting => "requesting",
        })
    }
}

/// Everything that can end a request or one of its sub-operations early.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// Radio-level connect failure.
    #[error("cannot connect: {0}")]
    Connection(#[source] RadioError),

    /// Service or characteristic enumeration failed.
    #[error("cannot discover services: {0}")]
    Discovery(#[source] RadioError),

    /// A handle read failed.
    #[error("cannot read {what}: {source}")]
    Read {
        /// What was being read (`battery`, `data`).
        what: &'static str,
        /// The radio failure.
        source: RadioError,
    },

    /// A handle write failed.
    #[error("cannot write: {0}")]
    Write(#[source] RadioError),

    /// Enabling notifications failed.
    #[error("cannot subscribe: {0}")]
    Subscribe(#[source] RadioError),

    /// Starting or stopping the discovery window failed.
    #[error("cannot scan: {0}")]
    Scan(#[source] RadioError),

    /// The payload did not match any recognised format.
    #[error("incorrect data: {0}")]
    Decode(#[from] DecodeError),

    /// No notification arrived before the listener expired.
    #[error("no notification within {0:?}")]
    ListenerExpired(std::time::Duration),

    /// The notification stream closed before delivering a payload.
    #[error("notification stream closed")]
    SubscriptionClosed,

    /// The advertisement stream ended before the wanted event showed up.
    #[error("advertisements ended without {0}")]
    AdvertisementsEnded(&'static str),

    /// The discovery window expired without a match.
    #[error("not found")]
    NotFound {
        /// The address that was searched for.
        address: BleAddress,
        /// Every distinct address seen during the window.
        seen: Vec<BleAddress>,
    },

    /// A scan or session is already active for this device.
    #[error("{0}")]
    Busy(BusyKind),

    /// The radio is not powered on.
    #[error("device status: {0}")]
    RadioUnavailable(RadioState),

    /// No address in the request and none configured.
    #[error("address is not specified")]
    MissingAddress,

    /// The requested address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressParseError),
}

impl AcquisitionError {
    /// The status update reporting this error.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Busy(BusyKind::Scanning) => Status::still_searching(),
            Self::Busy(BusyKind::Requesting) => Status::busy(),
            Self::ListenerExpired(_) => Status::new(Severity::Warning, self.to_string()),
            _ => Status::new(Severity::Error, self.to_string()),
        }
    }
}
