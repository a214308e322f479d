//! Radio port — the BLE primitives the core needs from the host stack.
//!
//! Every operation is asynchronous; completion order between independent
//! operations is unspecified. Implementations live in adapter crates
//! (`btleplug` for real hardware, `virtual` for simulation).

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio_stream::{Stream, StreamExt as _};

use blepoll_domain::address::BleAddress;
use blepoll_domain::advertisement::Advertisement;
use blepoll_domain::codec::GattHandle;

/// A boxed, sendable stream.
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Resolves once the peripheral reports a disconnection.
pub type DisconnectSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Errors reported by a radio implementation.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// The operation needs a connection that is not established.
    #[error("peripheral is not connected")]
    NotConnected,

    /// The peripheral does not expose the requested characteristic.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound {
        /// The missing characteristic.
        uuid: uuid::Uuid,
    },

    /// A failure inside the radio backend.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl RadioError {
    /// Wrap a backend-specific error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Power state of the host radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    /// Ready to scan and connect.
    PoweredOn,
    /// Switched off or blocked.
    PoweredOff,
    /// Not yet known.
    Unknown,
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PoweredOn => "poweredOn",
            Self::PoweredOff => "poweredOff",
            Self::Unknown => "unknown",
        })
    }
}

/// How a write is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Wait for the peripheral to confirm the write.
    WithResponse,
    /// Fire and forget.
    WithoutResponse,
}

/// A discovered peripheral: the radio's handle plus what it advertised.
#[derive(Debug, Clone)]
pub struct PeripheralHandle<P> {
    /// Radio-specific peripheral object.
    pub peripheral: P,
    /// Device address.
    pub address: BleAddress,
    /// Advertisement captured when the peripheral was discovered.
    pub advertisement: Advertisement,
}

/// The host BLE radio.
pub trait Radio: Send + Sync + 'static {
    /// Peripheral type produced by discovery.
    type Peripheral: RadioPeripheral;

    /// Current power state.
    fn state(&self) -> impl Future<Output = Result<RadioState, RadioError>> + Send;

    /// Wait for the next power state change and return the new state.
    fn next_state_change(&self) -> impl Future<Output = Result<RadioState, RadioError>> + Send;

    /// Start scanning and return the stream of discoveries.
    ///
    /// `services` filters advertisements by service UUID (empty: no filter).
    /// With `allow_duplicates`, a peripheral is reported again every time it
    /// advertises, carrying the latest advertisement data.
    fn start_scan(
        &self,
        services: &[uuid::Uuid],
        allow_duplicates: bool,
    ) -> impl Future<Output = Result<BoxStream<PeripheralHandle<Self::Peripheral>>, RadioError>> + Send;

    /// Stop scanning. Stopping an idle radio is not an error.
    fn stop_scan(&self) -> impl Future<Output = Result<(), RadioError>> + Send;
}

/// One remote peripheral.
pub trait RadioPeripheral: Clone + Send + Sync + 'static {
    /// Establish a connection.
    fn connect(&self) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// Close the connection. Disconnecting twice is not an error.
    fn disconnect(&self) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// Register interest in the next disconnection of this peripheral.
    ///
    /// Must be called before [`connect`](Self::connect) so no event is missed.
    fn disconnect_signal(&self) -> impl Future<Output = Result<DisconnectSignal, RadioError>> + Send;

    /// Read an attribute.
    fn read(&self, target: GattHandle) -> impl Future<Output = Result<Vec<u8>, RadioError>> + Send;

    /// Write an attribute.
    fn write(
        &self,
        target: GattHandle,
        data: &[u8],
        mode: WriteMode,
    ) -> impl Future<Output = Result<(), RadioError>> + Send;

    /// Discover the given services and return which of the given
    /// characteristics they expose.
    fn discover_characteristics(
        &self,
        services: &[uuid::Uuid],
        characteristics: &[uuid::Uuid],
    ) -> impl Future<Output = Result<Vec<uuid::Uuid>, RadioError>> + Send;

    /// Enable notifications on a characteristic.
    fn subscribe(
        &self,
        characteristic: uuid::Uuid,
    ) -> impl Future<Output = Result<Subscription, RadioError>> + Send;

    /// Stream further advertisements from this peripheral.
    fn advertisements(
        &self,
    ) -> impl Future<Output = Result<BoxStream<Advertisement>, RadioError>> + Send;
}

/// An active notification subscription.
///
/// Cancelling detaches the listener and runs the radio's unsubscribe hook.
/// Cancelling is idempotent and also happens on drop, so a subscription can
/// never outlive the session that created it.
pub struct Subscription {
    notifications: Option<BoxStream<Vec<u8>>>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a notification stream and the hook that undoes the subscription.
    pub fn new(
        notifications: BoxStream<Vec<u8>>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            notifications: Some(notifications),
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Next notification payload; `None` once cancelled or closed.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        match self.notifications.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    /// Detach the listener. Only the first call has an effect.
    pub fn cancel(&mut self) {
        self.notifications = None;
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
    }

    /// Whether [`cancel`](Self::cancel) already ran.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.on_cancel.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
