//! Virtual peripheral — plays a [`VirtualSensor`] script over the radio port.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use blepoll_app::ports::{
    BoxStream, DisconnectSignal, RadioError, RadioPeripheral, Subscription, WriteMode,
};
use blepoll_domain::advertisement::Advertisement;
use blepoll_domain::codec::GattHandle;

use crate::sensor::VirtualSensor;

/// Call counters shared by a radio and its peripherals.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) scan_starts: AtomicUsize,
    pub(crate) scan_stops: AtomicUsize,
    pub(crate) connects: AtomicUsize,
    pub(crate) disconnects: AtomicUsize,
    pub(crate) reads: AtomicUsize,
    pub(crate) writes: AtomicUsize,
    pub(crate) subscriptions: AtomicUsize,
    pub(crate) unsubscribes: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Snapshot of the radio call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioStats {
    /// Scans started.
    pub scan_starts: usize,
    /// Scans stopped.
    pub scan_stops: usize,
    /// Connection attempts, successful or not.
    pub connects: usize,
    /// Disconnect calls that closed an established connection.
    pub disconnects: usize,
    /// Attribute reads.
    pub reads: usize,
    /// Attribute writes.
    pub writes: usize,
    /// Notification subscriptions.
    pub subscriptions: usize,
    /// Cancelled subscriptions.
    pub unsubscribes: usize,
}

impl From<&Counters> for RadioStats {
    fn from(counters: &Counters) -> Self {
        let get = |counter: &AtomicUsize| counter.load(Ordering::SeqCst);
        Self {
            scan_starts: get(&counters.scan_starts),
            scan_stops: get(&counters.scan_stops),
            connects: get(&counters.connects),
            disconnects: get(&counters.disconnects),
            reads: get(&counters.reads),
            writes: get(&counters.writes),
            subscriptions: get(&counters.subscriptions),
            unsubscribes: get(&counters.unsubscribes),
        }
    }
}

struct Inner {
    sensor: VirtualSensor,
    counters: Arc<Counters>,
    connected: AtomicBool,
    disconnected: broadcast::Sender<()>,
}

/// A simulated peripheral.
#[derive(Clone)]
pub struct VirtualPeripheral {
    inner: Arc<Inner>,
}

impl fmt::Debug for VirtualPeripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualPeripheral")
            .field("address", &self.inner.sensor.address)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl VirtualPeripheral {
    pub(crate) fn new(sensor: VirtualSensor, counters: Arc<Counters>) -> Self {
        let (disconnected, _) = broadcast::channel(4);
        Self {
            inner: Arc::new(Inner {
                sensor,
                counters,
                connected: AtomicBool::new(false),
                disconnected,
            }),
        }
    }

    pub(crate) fn sensor(&self) -> &VirtualSensor {
        &self.inner.sensor
    }

    /// Whether a connection is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Drop the connection as if the device went out of range.
    pub fn drop_connection(&self) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            tracing::debug!(address = %self.inner.sensor.address, "virtual link lost");
            let _ = self.inner.disconnected.send(());
        }
    }

    fn ensure_connected(&self) -> Result<(), RadioError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(RadioError::NotConnected)
        }
    }

    fn io_failure(what: &str) -> RadioError {
        RadioError::backend(io::Error::other(format!("virtual {what} failure")))
    }
}

impl RadioPeripheral for VirtualPeripheral {
    fn connect(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        let this = self.clone();
        async move {
            Counters::bump(&this.inner.counters.connects);
            tokio::time::sleep(this.inner.sensor.io_delay).await;
            if this.inner.sensor.faults.refuse_connect {
                return Err(RadioError::backend(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }

            this.inner.connected.store(true, Ordering::SeqCst);
            if let Some(delay) = this.inner.sensor.faults.disconnect_after {
                let link = this.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    link.drop_connection();
                });
            }
            Ok(())
        }
    }

    fn disconnect(&self) -> impl Future<Output = Result<(), RadioError>> + Send {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            Counters::bump(&self.inner.counters.disconnects);
            let _ = self.inner.disconnected.send(());
        }
        async { Ok(()) }
    }

    fn disconnect_signal(
        &self,
    ) -> impl Future<Output = Result<DisconnectSignal, RadioError>> + Send {
        let mut events = self.inner.disconnected.subscribe();
        async move {
            let signal: DisconnectSignal = Box::pin(async move {
                let _ = events.recv().await;
            });
            Ok(signal)
        }
    }

    fn read(&self, target: GattHandle) -> impl Future<Output = Result<Vec<u8>, RadioError>> + Send {
        let this = self.clone();
        async move {
            Counters::bump(&this.inner.counters.reads);
            this.ensure_connected()?;
            tokio::time::sleep(this.inner.sensor.io_delay).await;
            this.ensure_connected()?;
            if this.inner.sensor.faults.failing_reads.contains(&target.handle) {
                return Err(Self::io_failure("read"));
            }
            this.inner
                .sensor
                .reads
                .get(&target.handle)
                .cloned()
                .ok_or(RadioError::CharacteristicNotFound { uuid: target.uuid })
        }
    }

    fn write(
        &self,
        target: GattHandle,
        data: &[u8],
        mode: WriteMode,
    ) -> impl Future<Output = Result<(), RadioError>> + Send {
        let this = self.clone();
        let len = data.len();
        async move {
            Counters::bump(&this.inner.counters.writes);
            this.ensure_connected()?;
            tokio::time::sleep(this.inner.sensor.io_delay).await;
            if this.inner.sensor.faults.fail_writes {
                return Err(Self::io_failure("write"));
            }
            tracing::debug!(handle = target.handle, len, ?mode, "virtual write");
            Ok(())
        }
    }

    fn discover_characteristics(
        &self,
        _services: &[uuid::Uuid],
        characteristics: &[uuid::Uuid],
    ) -> impl Future<Output = Result<Vec<uuid::Uuid>, RadioError>> + Send {
        let wanted = characteristics.to_vec();
        let this = self.clone();
        async move {
            this.ensure_connected()?;
            tokio::time::sleep(this.inner.sensor.io_delay).await;
            Ok(this
                .inner
                .sensor
                .characteristics
                .iter()
                .filter(|uuid| wanted.contains(uuid))
                .copied()
                .collect())
        }
    }

    fn subscribe(
        &self,
        characteristic: uuid::Uuid,
    ) -> impl Future<Output = Result<Subscription, RadioError>> + Send {
        let this = self.clone();
        async move {
            Counters::bump(&this.inner.counters.subscriptions);
            this.ensure_connected()?;
            if !this.inner.sensor.characteristics.contains(&characteristic) {
                return Err(RadioError::CharacteristicNotFound {
                    uuid: characteristic,
                });
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let payloads = this.inner.sensor.notifications.clone();
            let delay = this.inner.sensor.notify_after;
            let feeder = tokio::spawn(async move {
                for payload in payloads {
                    tokio::time::sleep(delay).await;
                    if tx.send(payload).is_err() {
                        return;
                    }
                }
                tx.closed().await;
            });

            let counters = Arc::clone(&this.inner.counters);
            let stream: BoxStream<Vec<u8>> = Box::pin(UnboundedReceiverStream::new(rx));
            Ok(Subscription::new(stream, move || {
                feeder.abort();
                Counters::bump(&counters.unsubscribes);
            }))
        }
    }

    fn advertisements(
        &self,
    ) -> impl Future<Output = Result<BoxStream<Advertisement>, RadioError>> + Send {
        let (tx, rx) = mpsc::unbounded_channel();
        let script = self.inner.sensor.later_advertisements.clone();
        let every = self.inner.sensor.advertise_every;
        tokio::spawn(async move {
            for advertisement in script {
                tokio::time::sleep(every).await;
                if tx.send(advertisement).is_err() {
                    return;
                }
            }
        });
        async move {
            let stream: BoxStream<Advertisement> = Box::pin(UnboundedReceiverStream::new(rx));
            Ok(stream)
        }
    }
}
