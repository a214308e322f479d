//! In-memory radio used by the unit tests of this crate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio_stream::StreamExt as _;

use blepoll_domain::address::BleAddress;
use blepoll_domain::advertisement::Advertisement;
use blepoll_domain::codec::GattHandle;

use crate::ports::{
    BoxStream, DisconnectSignal, PeripheralHandle, Radio, RadioError, RadioPeripheral, RadioState,
    Subscription, WriteMode,
};

// ── Radio ─────────────────────────────────────────────────────────

pub(crate) struct FakeRadio {
    pub(crate) state: Mutex<RadioState>,
    pub(crate) next_state: Mutex<Option<RadioState>>,
    pub(crate) discoveries: Mutex<Vec<PeripheralHandle<FakePeripheral>>>,
    pub(crate) scan_starts: AtomicUsize,
    pub(crate) scan_stops: AtomicUsize,
}

impl FakeRadio {
    pub(crate) fn powered_on(discoveries: Vec<PeripheralHandle<FakePeripheral>>) -> Self {
        Self {
            state: Mutex::new(RadioState::PoweredOn),
            next_state: Mutex::new(None),
            discoveries: Mutex::new(discoveries),
            scan_starts: AtomicUsize::new(0),
            scan_stops: AtomicUsize::new(0),
        }
    }
}

impl Radio for FakeRadio {
    type Peripheral = FakePeripheral;

    fn state(&self) -> impl Future<Output = Result<RadioState, RadioError>> + Send {
        let state = *self.state.lock().unwrap();
        async move { Ok(state) }
    }

    fn next_state_change(&self) -> impl Future<Output = Result<RadioState, RadioError>> + Send {
        let next = *self.next_state.lock().unwrap();
        async move {
            match next {
                Some(state) => Ok(state),
                None => std::future::pending().await,
            }
        }
    }

    fn start_scan(
        &self,
        _services: &[uuid::Uuid],
        _allow_duplicates: bool,
    ) -> impl Future<Output = Result<BoxStream<PeripheralHandle<FakePeripheral>>, RadioError>> + Send
    {
        self.scan_starts.fetch_add(1, Ordering::SeqCst);
        let found = self.discoveries.lock().unwrap().clone();
        async move {
            let stream: BoxStream<PeripheralHandle<FakePeripheral>> =
                Box::pin(tokio_stream::iter(found).chain(tokio_stream::pending()));
            Ok(stream)
        }
    }

    fn stop_scan(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        self.scan_stops.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    }
}

// ── Peripheral ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct FakeInner {
    reads: Mutex<HashMap<u16, Vec<u8>>>,
    pub(crate) writes: Mutex<Vec<(u16, Vec<u8>)>>,
    fail_writes: AtomicBool,
    characteristics: Mutex<Vec<uuid::Uuid>>,
    notifications: Mutex<Vec<Vec<u8>>>,
    pub(crate) unsubscribes: Arc<AtomicUsize>,
    advertisements: Mutex<Vec<Advertisement>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakePeripheral {
    pub(crate) inner: Arc<FakeInner>,
}

impl FakePeripheral {
    pub(crate) fn with_read(self, handle: u16, data: &[u8]) -> Self {
        self.inner.reads.lock().unwrap().insert(handle, data.to_vec());
        self
    }

    pub(crate) fn with_failing_writes(self) -> Self {
        self.inner.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_characteristic(self, uuid: uuid::Uuid) -> Self {
        self.inner.characteristics.lock().unwrap().push(uuid);
        self
    }

    pub(crate) fn with_notification(self, data: &[u8]) -> Self {
        self.inner.notifications.lock().unwrap().push(data.to_vec());
        self
    }

    pub(crate) fn with_advertisement(self, advertisement: Advertisement) -> Self {
        self.inner.advertisements.lock().unwrap().push(advertisement);
        self
    }

    pub(crate) fn handle(self, address: &str, advertisement: Advertisement) -> PeripheralHandle<Self> {
        PeripheralHandle {
            peripheral: self,
            address: address.parse::<BleAddress>().unwrap(),
            advertisement,
        }
    }
}

impl RadioPeripheral for FakePeripheral {
    fn connect(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        async { Ok(()) }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        async { Ok(()) }
    }

    fn disconnect_signal(
        &self,
    ) -> impl Future<Output = Result<DisconnectSignal, RadioError>> + Send {
        async {
            let signal: DisconnectSignal = Box::pin(std::future::pending());
            Ok(signal)
        }
    }

    fn read(&self, target: GattHandle) -> impl Future<Output = Result<Vec<u8>, RadioError>> + Send {
        let data = self.inner.reads.lock().unwrap().get(&target.handle).cloned();
        async move {
            data.ok_or(RadioError::CharacteristicNotFound { uuid: target.uuid })
        }
    }

    fn write(
        &self,
        target: GattHandle,
        data: &[u8],
        _mode: WriteMode,
    ) -> impl Future<Output = Result<(), RadioError>> + Send {
        let result = if self.inner.fail_writes.load(Ordering::SeqCst) {
            Err(RadioError::NotConnected)
        } else {
            self.inner
                .writes
                .lock()
                .unwrap()
                .push((target.handle, data.to_vec()));
            Ok(())
        };
        async move { result }
    }

    fn discover_characteristics(
        &self,
        _services: &[uuid::Uuid],
        characteristics: &[uuid::Uuid],
    ) -> impl Future<Output = Result<Vec<uuid::Uuid>, RadioError>> + Send {
        let found: Vec<_> = self
            .inner
            .characteristics
            .lock()
            .unwrap()
            .iter()
            .filter(|uuid| characteristics.contains(uuid))
            .copied()
            .collect();
        async move { Ok(found) }
    }

    fn subscribe(
        &self,
        _characteristic: uuid::Uuid,
    ) -> impl Future<Output = Result<Subscription, RadioError>> + Send {
        let payloads = self.inner.notifications.lock().unwrap().clone();
        let unsubscribes = Arc::clone(&self.inner.unsubscribes);
        async move {
            let stream: BoxStream<Vec<u8>> =
                Box::pin(tokio_stream::iter(payloads).chain(tokio_stream::pending()));
            Ok(Subscription::new(stream, move || {
                unsubscribes.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    fn advertisements(
        &self,
    ) -> impl Future<Output = Result<BoxStream<Advertisement>, RadioError>> + Send {
        let advertisements = self.inner.advertisements.lock().unwrap().clone();
        async move {
            let stream: BoxStream<Advertisement> = Box::pin(tokio_stream::iter(advertisements));
            Ok(stream)
        }
    }
}
