//! Per-family sub-operations run inside an acquisition session.
//!
//! Each family contributes exactly two independent sub-operations; the
//! session runs them concurrently and merges whatever they return.
//!
//! | Family | Sub-operation 1 | Sub-operation 2 |
//! |--------|-----------------|-----------------|
//! | notify | battery read `0x18` | discover + subscribe, first notification |
//! | soil | battery read `0x38` | write `[A0 1F]` to `0x33`, read `0x35` |
//! | broadcast | battery event from advertisements | climate event from advertisements |

use std::time::Duration;

use tokio_stream::StreamExt as _;

use blepoll_domain::advertisement::Advertisement;
use blepoll_domain::codec::notify::{self, NotifyEncoding};
use blepoll_domain::codec::{GattHandle, broadcast, decode_battery, soil};
use blepoll_domain::error::DecodeError;
use blepoll_domain::family::DeviceFamily;
use blepoll_domain::reading::Contribution;

use crate::error::AcquisitionError;
use crate::ports::{RadioError, RadioPeripheral, WriteMode};

/// Which event a broadcast sub-operation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastField {
    /// Temperature and humidity (event `0x01`).
    Climate,
    /// Battery percentage (event `0x02`).
    Battery,
}

impl BroadcastField {
    fn name(self) -> &'static str {
        match self {
            Self::Climate => "climate event",
            Self::Battery => "battery event",
        }
    }

    fn pick(self, advertisement: &Advertisement) -> Result<Option<Contribution>, DecodeError> {
        let Some(frame) = broadcast::decode_advertisement(advertisement)? else {
            return Ok(None);
        };
        Ok(match self {
            Self::Climate => frame.climate().map(Contribution::Climate),
            Self::Battery => frame.battery().map(Contribution::Battery),
        })
    }
}

/// One independent step of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubOperation {
    /// Read the battery percentage from a fixed handle.
    Battery(GattHandle),
    /// Discover the climate characteristic and wait for one notification.
    NotifyClimate,
    /// Trigger a soil measurement and read it back.
    SoilMeasurement,
    /// Wait for an event in the peripheral's advertisements.
    Broadcast(BroadcastField),
}

impl SubOperation {
    /// The two sub-operations making up an acquisition for `family`.
    #[must_use]
    pub fn for_family(family: DeviceFamily) -> [Self; 2] {
        match family {
            DeviceFamily::NotifySensor => [Self::Battery(notify::BATTERY), Self::NotifyClimate],
            DeviceFamily::SoilSensor => [Self::Battery(soil::BATTERY), Self::SoilMeasurement],
            DeviceFamily::BroadcastSensor => [
                Self::Broadcast(BroadcastField::Battery),
                Self::Broadcast(BroadcastField::Climate),
            ],
        }
    }

    /// Run the sub-operation against `peripheral`.
    ///
    /// `captured` is the advertisement seen during discovery.
    ///
    /// # Errors
    ///
    /// Returns the [`AcquisitionError`] that stopped this sub-operation;
    /// the other sub-operations of the session are unaffected.
    pub async fn run<P: RadioPeripheral>(
        self,
        peripheral: &P,
        captured: &Advertisement,
        listener_expiry: Duration,
    ) -> Result<Contribution, AcquisitionError> {
        match self {
            Self::Battery(target) => read_battery(peripheral, target).await,
            Self::NotifyClimate => notify_climate(peripheral, listener_expiry).await,
            Self::SoilMeasurement => soil_measurement(peripheral).await,
            Self::Broadcast(field) => broadcast_event(peripheral, captured, field).await,
        }
    }
}

/// Read a battery handle and decode its first byte.
///
/// # Errors
///
/// [`AcquisitionError::Read`] on radio failure, [`AcquisitionError::Decode`]
/// on an empty payload.
pub async fn read_battery<P: RadioPeripheral>(
    peripheral: &P,
    target: GattHandle,
) -> Result<Contribution, AcquisitionError> {
    let data = peripheral
        .read(target)
        .await
        .map_err(|source| AcquisitionError::Read {
            what: "battery",
            source,
        })?;
    Ok(Contribution::Battery(decode_battery(&data)?))
}

/// Subscribe to the climate characteristic and decode the first notification.
///
/// The encoding is chosen by which characteristic the device exposes. The
/// subscription is cancelled as soon as one payload arrives or the listener
/// expires, so later notifications are never decoded.
///
/// # Errors
///
/// - [`AcquisitionError::Discovery`] when neither characteristic is found
/// - [`AcquisitionError::Subscribe`] when notifications cannot be enabled
/// - [`AcquisitionError::ListenerExpired`] when nothing arrives in time
/// - [`AcquisitionError::Decode`] when the payload is unrecognised
pub async fn notify_climate<P: RadioPeripheral>(
    peripheral: &P,
    listener_expiry: Duration,
) -> Result<Contribution, AcquisitionError> {
    let found = peripheral
        .discover_characteristics(&notify::SERVICES, &notify::CHARACTERISTICS)
        .await
        .map_err(AcquisitionError::Discovery)?;

    let (characteristic, encoding) = found
        .iter()
        .find_map(|uuid| NotifyEncoding::from_characteristic(*uuid).map(|enc| (*uuid, enc)))
        .ok_or(AcquisitionError::Discovery(
            RadioError::CharacteristicNotFound {
                uuid: notify::CHARACTERISTICS[0],
            },
        ))?;
    tracing::debug!(%characteristic, ?encoding, "subscribing to climate notifications");

    let mut subscription = peripheral
        .subscribe(characteristic)
        .await
        .map_err(AcquisitionError::Subscribe)?;
    let first = tokio::time::timeout(listener_expiry, subscription.next()).await;
    subscription.cancel();

    match first {
        Ok(Some(payload)) => Ok(Contribution::Climate(encoding.decode(&payload)?)),
        Ok(None) => Err(AcquisitionError::SubscriptionClosed),
        Err(_) => Err(AcquisitionError::ListenerExpired(listener_expiry)),
    }
}

/// Write the measurement trigger, then read the measurement block.
///
/// # Errors
///
/// [`AcquisitionError::Write`] or [`AcquisitionError::Read`] on radio
/// failure, [`AcquisitionError::Decode`] on a short block.
pub async fn soil_measurement<P: RadioPeripheral>(
    peripheral: &P,
) -> Result<Contribution, AcquisitionError> {
    peripheral
        .write(soil::TRIGGER, &soil::TRIGGER_COMMAND, WriteMode::WithResponse)
        .await
        .map_err(AcquisitionError::Write)?;
    let data = peripheral
        .read(soil::MEASUREMENT)
        .await
        .map_err(|source| AcquisitionError::Read {
            what: "data",
            source,
        })?;
    Ok(Contribution::Soil(soil::decode_measurement(&data)?))
}

/// Find a broadcast event, first in the captured advertisement, then in
/// further advertisements.
///
/// Malformed blocks are logged and skipped; the next advertisement may be
/// fine.
///
/// # Errors
///
/// [`AcquisitionError::Scan`] when advertisements cannot be watched,
/// [`AcquisitionError::AdvertisementsEnded`] when the stream closes first.
pub async fn broadcast_event<P: RadioPeripheral>(
    peripheral: &P,
    captured: &Advertisement,
    field: BroadcastField,
) -> Result<Contribution, AcquisitionError> {
    match field.pick(captured) {
        Ok(Some(contribution)) => return Ok(contribution),
        Ok(None) => {}
        Err(err) => tracing::warn!(%err, "skipping malformed broadcast block"),
    }

    let mut advertisements = peripheral
        .advertisements()
        .await
        .map_err(AcquisitionError::Scan)?;
    while let Some(advertisement) = advertisements.next().await {
        match field.pick(&advertisement) {
            Ok(Some(contribution)) => return Ok(contribution),
            Ok(None) => {}
            Err(err) => tracing::warn!(%err, "skipping malformed broadcast block"),
        }
    }

    Err(AcquisitionError::AdvertisementsEnded(field.name()))
}
