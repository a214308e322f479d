//! The host adapter as a [`Radio`].

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt as _};

use blepoll_app::ports::{BoxStream, PeripheralHandle, Radio, RadioError, RadioState};
use blepoll_domain::advertisement::Advertisement;

use crate::address;
use crate::error::{BtleplugError, radio};
use crate::peripheral::BtleplugPeripheral;

pub(crate) type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Scan generations shared by the radio and its peripherals.
///
/// Every start bumps the generation; a stop tied to an older generation is
/// skipped so it cannot end a scan started after it.
#[derive(Clone, Default)]
pub(crate) struct ScanLease(Arc<tokio::sync::Mutex<u64>>);

impl ScanLease {
    /// Run `start` and return the generation of the scan it opened.
    pub(crate) async fn start<E>(
        &self,
        start: impl Future<Output = Result<(), E>>,
    ) -> Result<u64, E> {
        let mut current = self.0.lock().await;
        start.await?;
        *current += 1;
        Ok(*current)
    }

    /// Run `stop` unless a scan newer than `generation` is running.
    /// `None` stops whatever runs. Returns whether `stop` ran.
    pub(crate) async fn stop<E>(
        &self,
        generation: Option<u64>,
        stop: impl Future<Output = Result<(), E>>,
    ) -> Result<bool, E> {
        let current = self.0.lock().await;
        if generation.is_some_and(|owned| owned != *current) {
            return Ok(false);
        }
        stop.await?;
        Ok(true)
    }
}

/// A host Bluetooth adapter driven through btleplug.
pub struct BtleplugRadio {
    adapter: Adapter,
    lease: ScanLease,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugRadio {
    /// Open the first adapter the platform reports.
    ///
    /// # Errors
    ///
    /// Returns [`BtleplugError::NotAvailable`] when the host has no adapter
    /// and [`BtleplugError::Ble`] when the platform manager fails.
    pub async fn first_adapter() -> Result<Self, BtleplugError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BtleplugError::NotAvailable)?;
        if let Ok(info) = adapter.adapter_info().await {
            tracing::info!(adapter = %info, "using BLE adapter");
        }
        Ok(Self {
            adapter,
            lease: ScanLease::default(),
            forwarder: Mutex::new(None),
        })
    }

    /// Swap the discovery forwarder; `true` when one was running.
    fn replace_forwarder(&self, next: Option<JoinHandle<()>>) -> bool {
        let mut slot = self.forwarder.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(previous) = std::mem::replace(&mut *slot, next) else {
            return false;
        };
        previous.abort();
        true
    }
}

impl Radio for BtleplugRadio {
    type Peripheral = BtleplugPeripheral;

    fn state(&self) -> impl Future<Output = Result<RadioState, RadioError>> + Send {
        async move {
            let state = self.adapter.adapter_state().await.map_err(radio)?;
            Ok(radio_state(state))
        }
    }

    fn next_state_change(&self) -> impl Future<Output = Result<RadioState, RadioError>> + Send {
        async move {
            let mut events = self.adapter.events().await.map_err(radio)?;
            while let Some(event) = events.next().await {
                if let CentralEvent::StateUpdate(state) = event {
                    return Ok(radio_state(state));
                }
            }
            Err(RadioError::NotAvailable)
        }
    }

    fn start_scan(
        &self,
        services: &[uuid::Uuid],
        allow_duplicates: bool,
    ) -> impl Future<Output = Result<BoxStream<PeripheralHandle<BtleplugPeripheral>>, RadioError>>
    + Send {
        let filter = ScanFilter {
            services: services.to_vec(),
        };
        async move {
            let events = self.adapter.events().await.map_err(radio)?;
            self.lease
                .start(self.adapter.start_scan(filter))
                .await
                .map_err(radio)?;

            let (tx, rx) = mpsc::unbounded_channel();
            let forwarder = tokio::spawn(forward_discoveries(
                self.adapter.clone(),
                self.lease.clone(),
                events,
                tx,
                allow_duplicates,
            ));
            self.replace_forwarder(Some(forwarder));
            tracing::debug!(allow_duplicates, "scan started");

            let stream: BoxStream<PeripheralHandle<BtleplugPeripheral>> =
                Box::pin(UnboundedReceiverStream::new(rx));
            Ok(stream)
        }
    }

    fn stop_scan(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        async move {
            if self.replace_forwarder(None) {
                tracing::debug!("scan stopped");
            }
            self.lease
                .stop(None, self.adapter.stop_scan())
                .await
                .map(|_| ())
                .map_err(radio)
        }
    }
}

/// Turn adapter events into discovery reports until the receiver goes away.
async fn forward_discoveries(
    adapter: Adapter,
    lease: ScanLease,
    mut events: CentralEvents,
    discoveries: mpsc::UnboundedSender<PeripheralHandle<BtleplugPeripheral>>,
    allow_duplicates: bool,
) {
    let mut reported: HashSet<PeripheralId> = HashSet::new();
    loop {
        let event = tokio::select! {
            () = discoveries.closed() => return,
            event = events.next() => event,
        };
        let Some(event) = event else { return };
        let Some(id) = discovered_id(event) else {
            continue;
        };
        if !allow_duplicates && reported.contains(&id) {
            continue;
        }
        match snapshot(&adapter, &lease, &id).await {
            Ok(Some(handle)) => {
                reported.insert(id);
                if discoveries.send(handle).is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(%err, "cannot read peripheral properties"),
        }
    }
}

fn discovered_id(event: CentralEvent) -> Option<PeripheralId> {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ServiceDataAdvertisement { id, .. }
        | CentralEvent::ServicesAdvertisement { id, .. } => Some(id),
        _ => None,
    }
}

async fn snapshot(
    adapter: &Adapter,
    lease: &ScanLease,
    id: &PeripheralId,
) -> Result<Option<PeripheralHandle<BtleplugPeripheral>>, btleplug::Error> {
    let peripheral = adapter.peripheral(id).await?;
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };
    let (reported, advertisement) = advertisement(properties);
    Ok(Some(PeripheralHandle {
        address: address::resolve(reported, &advertisement),
        peripheral: BtleplugPeripheral::new(adapter.clone(), lease.clone(), peripheral),
        advertisement,
    }))
}

fn advertisement(properties: PeripheralProperties) -> ([u8; 6], Advertisement) {
    (
        properties.address.into_inner(),
        Advertisement {
            local_name: properties.local_name,
            services: properties.services,
            service_data: properties.service_data,
            rssi: properties.rssi,
        },
    )
}

fn radio_state(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::PoweredOn,
        CentralState::PoweredOff => RadioState::PoweredOff,
        _ => RadioState::Unknown,
    }
}
