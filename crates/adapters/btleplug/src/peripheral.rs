//! A btleplug peripheral as a [`RadioPeripheral`].
//!
//! btleplug addresses attributes by characteristic UUID, not by ATT handle,
//! so every [`GattHandle`] is resolved through its UUID after service
//! discovery.

use std::fmt;
use std::future::Future;

use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use tokio::sync::mpsc;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;

use blepoll_app::ports::{
    BoxStream, DisconnectSignal, RadioError, RadioPeripheral, Subscription, WriteMode,
};
use blepoll_domain::advertisement::Advertisement;
use blepoll_domain::codec::GattHandle;

use crate::error::radio;
use crate::radio::{CentralEvents, ScanLease};

/// A peripheral found by [`BtleplugRadio`](crate::BtleplugRadio).
#[derive(Clone)]
pub struct BtleplugPeripheral {
    adapter: Adapter,
    lease: ScanLease,
    peripheral: Peripheral,
}

impl fmt::Debug for BtleplugPeripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BtleplugPeripheral")
            .field("id", &self.peripheral.id())
            .finish_non_exhaustive()
    }
}

impl BtleplugPeripheral {
    pub(crate) fn new(adapter: Adapter, lease: ScanLease, peripheral: Peripheral) -> Self {
        Self {
            adapter,
            lease,
            peripheral,
        }
    }

    /// Find a characteristic by UUID, discovering services on first use.
    async fn characteristic(&self, uuid: uuid::Uuid) -> Result<Characteristic, RadioError> {
        if self.peripheral.characteristics().is_empty() {
            self.peripheral.discover_services().await.map_err(radio)?;
        }
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(RadioError::CharacteristicNotFound { uuid })
    }
}

impl RadioPeripheral for BtleplugPeripheral {
    fn connect(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        async move { self.peripheral.connect().await.map_err(radio) }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        async move {
            if self.peripheral.is_connected().await.map_err(radio)? {
                self.peripheral.disconnect().await.map_err(radio)?;
            }
            Ok(())
        }
    }

    fn disconnect_signal(
        &self,
    ) -> impl Future<Output = Result<DisconnectSignal, RadioError>> + Send {
        async move {
            let mut events = self.adapter.events().await.map_err(radio)?;
            let id = self.peripheral.id();
            let signal: DisconnectSignal = Box::pin(async move {
                while let Some(event) = events.next().await {
                    if let CentralEvent::DeviceDisconnected(gone) = event
                        && gone == id
                    {
                        return;
                    }
                }
            });
            Ok(signal)
        }
    }

    fn read(&self, target: GattHandle) -> impl Future<Output = Result<Vec<u8>, RadioError>> + Send {
        async move {
            let characteristic = self.characteristic(target.uuid).await?;
            self.peripheral.read(&characteristic).await.map_err(radio)
        }
    }

    fn write(
        &self,
        target: GattHandle,
        data: &[u8],
        mode: WriteMode,
    ) -> impl Future<Output = Result<(), RadioError>> + Send {
        let data = data.to_vec();
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        async move {
            let characteristic = self.characteristic(target.uuid).await?;
            self.peripheral
                .write(&characteristic, &data, write_type)
                .await
                .map_err(radio)
        }
    }

    fn discover_characteristics(
        &self,
        services: &[uuid::Uuid],
        characteristics: &[uuid::Uuid],
    ) -> impl Future<Output = Result<Vec<uuid::Uuid>, RadioError>> + Send {
        let services = services.to_vec();
        let wanted = characteristics.to_vec();
        async move {
            self.peripheral.discover_services().await.map_err(radio)?;
            Ok(self
                .peripheral
                .characteristics()
                .into_iter()
                .filter(|c| wanted.contains(&c.uuid))
                .filter(|c| services.is_empty() || services.contains(&c.service_uuid))
                .map(|c| c.uuid)
                .collect())
        }
    }

    fn subscribe(
        &self,
        characteristic: uuid::Uuid,
    ) -> impl Future<Output = Result<Subscription, RadioError>> + Send {
        async move {
            let target = self.characteristic(characteristic).await?;
            let notifications = self.peripheral.notifications().await.map_err(radio)?;
            self.peripheral.subscribe(&target).await.map_err(radio)?;

            let stream: BoxStream<Vec<u8>> = Box::pin(
                notifications
                    .filter(move |notification| notification.uuid == characteristic)
                    .map(|notification| notification.value),
            );
            let peripheral = self.peripheral.clone();
            Ok(Subscription::new(stream, move || {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    return;
                };
                runtime.spawn(async move {
                    if let Err(err) = peripheral.unsubscribe(&target).await {
                        tracing::debug!(%err, "unsubscribe failed");
                    }
                });
            }))
        }
    }

    fn advertisements(
        &self,
    ) -> impl Future<Output = Result<BoxStream<Advertisement>, RadioError>> + Send {
        async move {
            let events = self.adapter.events().await.map_err(radio)?;
            let generation = self
                .lease
                .start(self.adapter.start_scan(ScanFilter::default()))
                .await
                .map_err(radio)?;

            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(forward_advertisements(
                self.adapter.clone(),
                self.lease.clone(),
                generation,
                self.peripheral.id(),
                events,
                tx,
            ));
            let stream: BoxStream<Advertisement> = Box::pin(UnboundedReceiverStream::new(rx));
            Ok(stream)
        }
    }
}

/// Forward service-data advertisements of one peripheral until the receiver
/// goes away, then stop the scan unless a newer one took over.
async fn forward_advertisements(
    adapter: Adapter,
    lease: ScanLease,
    generation: u64,
    id: PeripheralId,
    mut events: CentralEvents,
    advertisements: mpsc::UnboundedSender<Advertisement>,
) {
    loop {
        let event = tokio::select! {
            () = advertisements.closed() => break,
            event = events.next() => event,
        };
        match event {
            Some(CentralEvent::ServiceDataAdvertisement {
                id: from,
                service_data,
            }) if from == id => {
                let advertisement = Advertisement {
                    service_data,
                    ..Advertisement::default()
                };
                if advertisements.send(advertisement).is_err() {
                    break;
                }
            }
            Some(_) => {}
            None => break,
        }
    }
    match lease.stop(Some(generation), adapter.stop_scan()).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!("advertisement scan superseded, leaving it running"),
        Err(err) => tracing::debug!(%err, "cannot stop advertisement scan"),
    }
}
