//! # blepoll-adapter-virtual
//!
//! Simulated BLE radio for demonstration and testing.
//!
//! ## Provided presets
//!
//! | Preset | Family | Behaviour |
//! |--------|--------|-----------|
//! | [`VirtualSensor::mijia_text`] | notify | battery 87 %, notifies `T=24.5 H=55.0` |
//! | [`VirtualSensor::mijia_packed`] | notify | battery 75 %, notifies a packed frame |
//! | [`VirtualSensor::flora`] | soil | advertises `0xFE95`, answers the trigger/read exchange |
//! | [`VirtualSensor::cleargrass`] | broadcast | publishes climate and battery in `0xFDCD` service data |
//!
//! Every preset can be scripted with faults (refused connection, failing
//! reads/writes, silent notifications, dropped link) and the radio counts
//! every call so tests can assert on side effects.
//!
//! ## Dependency rule
//!
//! Depends on `blepoll-app` (port traits) and `blepoll-domain` only.

mod peripheral;
mod sensor;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use blepoll_app::ports::{BoxStream, PeripheralHandle, Radio, RadioError, RadioState};
use blepoll_domain::address::BleAddress;

pub use peripheral::{RadioStats, VirtualPeripheral};
pub use sensor::{Faults, VirtualSensor, broadcast_advertisement, broadcast_block};

use peripheral::Counters;

/// Addresses used by [`VirtualRadio::demo`].
pub mod demo {
    /// Text-notifying temperature/humidity sensor.
    pub const MIJIA_TEXT: &str = "4c:65:a8:d0:ae:64";
    /// Packed-notifying temperature/humidity sensor.
    pub const MIJIA_PACKED: &str = "a4:c1:38:5b:0e:df";
    /// Soil sensor.
    pub const FLORA: &str = "c4:7c:8d:6a:12:34";
    /// Broadcast-only sensor.
    pub const CLEARGRASS: &str = "58:2d:34:10:b2:9b";
}

/// A simulated radio hosting a fixed set of [`VirtualSensor`]s.
pub struct VirtualRadio {
    peripherals: Vec<VirtualPeripheral>,
    state: watch::Sender<RadioState>,
    counters: Arc<Counters>,
    scan: Mutex<Option<ActiveScan>>,
}

/// A running scan: one advertiser per matching sensor, plus the sender that
/// keeps the discovery stream open until the scan stops.
struct ActiveScan {
    advertisers: Vec<JoinHandle<()>>,
    _discoveries: mpsc::UnboundedSender<PeripheralHandle<VirtualPeripheral>>,
}

impl VirtualRadio {
    /// A powered-on radio hosting `sensors`.
    #[must_use]
    pub fn new(sensors: Vec<VirtualSensor>) -> Self {
        let counters = Arc::new(Counters::default());
        let peripherals = sensors
            .into_iter()
            .map(|sensor| VirtualPeripheral::new(sensor, Arc::clone(&counters)))
            .collect();
        let (state, _) = watch::channel(RadioState::PoweredOn);
        Self {
            peripherals,
            state,
            counters,
            scan: Mutex::new(None),
        }
    }

    /// One sensor of each preset at the [`demo`] addresses.
    #[must_use]
    pub fn demo() -> Self {
        let presets: [(&str, fn(BleAddress) -> VirtualSensor); 4] = [
            (demo::MIJIA_TEXT, VirtualSensor::mijia_text),
            (demo::MIJIA_PACKED, VirtualSensor::mijia_packed),
            (demo::FLORA, VirtualSensor::flora),
            (demo::CLEARGRASS, VirtualSensor::cleargrass),
        ];
        Self::new(
            presets
                .into_iter()
                .filter_map(|(address, preset)| address.parse().ok().map(preset))
                .collect(),
        )
    }

    /// Change the power state, waking anyone waiting for a state change.
    pub fn set_state(&self, state: RadioState) {
        self.state.send_replace(state);
    }

    /// Snapshot of the call counters.
    #[must_use]
    pub fn stats(&self) -> RadioStats {
        RadioStats::from(self.counters.as_ref())
    }

    /// The peripheral simulating `address`, if hosted.
    #[must_use]
    pub fn peripheral(&self, address: BleAddress) -> Option<&VirtualPeripheral> {
        self.peripherals
            .iter()
            .find(|peripheral| peripheral.sensor().address == address)
    }

    fn scan(&self) -> MutexGuard<'_, Option<ActiveScan>> {
        self.scan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Abort the running scan; `false` when none was running.
    fn abort_scan(&self) -> bool {
        let Some(scan) = self.scan().take() else {
            return false;
        };
        for advertiser in scan.advertisers {
            advertiser.abort();
        }
        true
    }
}

impl Radio for VirtualRadio {
    type Peripheral = VirtualPeripheral;

    fn state(&self) -> impl Future<Output = Result<RadioState, RadioError>> + Send {
        let state = *self.state.borrow();
        async move { Ok(state) }
    }

    fn next_state_change(&self) -> impl Future<Output = Result<RadioState, RadioError>> + Send {
        let mut changes = self.state.subscribe();
        async move {
            changes
                .changed()
                .await
                .map_err(|_| RadioError::NotAvailable)?;
            let state = *changes.borrow();
            Ok(state)
        }
    }

    fn start_scan(
        &self,
        services: &[uuid::Uuid],
        allow_duplicates: bool,
    ) -> impl Future<Output = Result<BoxStream<PeripheralHandle<VirtualPeripheral>>, RadioError>> + Send
    {
        let powered = *self.state.borrow() == RadioState::PoweredOn;
        let result = if powered {
            self.abort_scan();
            self.counters
                .scan_starts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

            let (tx, rx) = mpsc::unbounded_channel();
            let advertisers: Vec<_> = self
                .peripherals
                .iter()
                .filter(|peripheral| peripheral.sensor().matches_filter(services))
                .map(|peripheral| {
                    tokio::spawn(advertise(peripheral.clone(), tx.clone(), allow_duplicates))
                })
                .collect();
            tracing::debug!(
                sensors = advertisers.len(),
                allow_duplicates,
                "virtual scan started"
            );
            *self.scan() = Some(ActiveScan {
                advertisers,
                _discoveries: tx,
            });

            let stream: BoxStream<PeripheralHandle<VirtualPeripheral>> =
                Box::pin(UnboundedReceiverStream::new(rx));
            Ok(stream)
        } else {
            Err(RadioError::NotAvailable)
        };
        async move { result }
    }

    fn stop_scan(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        if self.abort_scan() {
            self.counters
                .scan_stops
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tracing::debug!("virtual scan stopped");
        }
        async { Ok(()) }
    }
}

/// Report `peripheral` to the scan stream, once or repeatedly.
async fn advertise(
    peripheral: VirtualPeripheral,
    discoveries: mpsc::UnboundedSender<PeripheralHandle<VirtualPeripheral>>,
    allow_duplicates: bool,
) {
    let sensor = peripheral.sensor().clone();
    tokio::time::sleep(sensor.first_seen_after).await;
    loop {
        let handle = PeripheralHandle {
            peripheral: peripheral.clone(),
            address: sensor.address,
            advertisement: sensor.advertisement.clone(),
        };
        if discoveries.send(handle).is_err() || !allow_duplicates {
            return;
        }
        tokio::time::sleep(sensor.advertise_every.max(Duration::from_millis(1))).await;
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt as _;

    use blepoll_domain::family::{Classifier, DeviceFamily};

    use super::*;

    // ── Scanning ──────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_discover_every_demo_sensor() {
        let radio = VirtualRadio::demo();
        let mut stream = radio.start_scan(&[], false).await.unwrap();

        let mut found = Vec::new();
        for _ in 0..4 {
            found.push(stream.next().await.unwrap().address.to_string());
        }
        found.sort();

        let mut expected = vec![
            demo::MIJIA_TEXT,
            demo::MIJIA_PACKED,
            demo::FLORA,
            demo::CLEARGRASS,
        ];
        expected.sort_unstable();
        assert_eq!(found, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn should_repeat_reports_when_duplicates_allowed() {
        let address: BleAddress = demo::FLORA.parse().unwrap();
        let radio = VirtualRadio::new(vec![VirtualSensor::flora(address)]);
        let mut stream = radio.start_scan(&[], true).await.unwrap();

        assert_eq!(stream.next().await.unwrap().address, address);
        assert_eq!(stream.next().await.unwrap().address, address);
    }

    #[tokio::test(start_paused = true)]
    async fn should_filter_by_advertised_service() {
        let radio = VirtualRadio::demo();
        let mut stream = radio
            .start_scan(&[blepoll_domain::codec::soil::ADVERTISED_SERVICE], false)
            .await
            .unwrap();

        let handle = stream.next().await.unwrap();
        assert_eq!(handle.address.to_string(), demo::FLORA);
    }

    #[tokio::test(start_paused = true)]
    async fn should_end_stream_when_scan_stopped() {
        let radio = VirtualRadio::demo();
        let mut stream = radio.start_scan(&[], true).await.unwrap();
        radio.stop_scan().await.unwrap();

        assert!(stream.next().await.is_none());
        let stats = radio.stats();
        assert_eq!(stats.scan_starts, 1);
        assert_eq!(stats.scan_stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_count_stop_of_empty_scan() {
        let radio = VirtualRadio::new(Vec::new());
        let _stream = radio.start_scan(&[], true).await.unwrap();
        radio.stop_scan().await.unwrap();
        radio.stop_scan().await.unwrap();

        assert_eq!(radio.stats().scan_stops, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_classify_demo_sensors() {
        let radio = VirtualRadio::demo();
        let classifier = Classifier::new(vec![demo::CLEARGRASS.parse().unwrap()]);
        let mut stream = radio.start_scan(&[], false).await.unwrap();

        for _ in 0..4 {
            let handle = stream.next().await.unwrap();
            let family = classifier.classify(handle.address, &handle.advertisement);
            let expected = match handle.address.to_string().as_str() {
                demo::FLORA => DeviceFamily::SoilSensor,
                demo::CLEARGRASS => DeviceFamily::BroadcastSensor,
                _ => DeviceFamily::NotifySensor,
            };
            assert_eq!(family, expected);
        }
    }

    // ── Power state ───────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_refuse_scan_while_powered_off() {
        let radio = VirtualRadio::demo();
        radio.set_state(RadioState::PoweredOff);
        assert!(matches!(
            radio.start_scan(&[], false).await,
            Err(RadioError::NotAvailable)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_next_state_change() {
        let radio = Arc::new(VirtualRadio::demo());
        radio.set_state(RadioState::PoweredOff);

        let waiter = tokio::spawn({
            let radio = Arc::clone(&radio);
            async move { radio.next_state_change().await }
        });
        tokio::task::yield_now().await;
        radio.set_state(RadioState::PoweredOn);

        assert_eq!(waiter.await.unwrap().unwrap(), RadioState::PoweredOn);
    }
}
