//! Scan controller — a bounded discovery window looking for one address.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tokio_stream::StreamExt as _;

use blepoll_domain::address::BleAddress;

use crate::error::{AcquisitionError, BusyKind};
use crate::ports::{BoxStream, PeripheralHandle, Radio, RadioState};

/// Runs discovery windows against the shared radio.
///
/// At most one window is open at a time; a concurrent [`find`](Self::find)
/// is rejected with [`BusyKind::Scanning`] instead of being queued.
pub struct ScanController<R> {
    radio: Arc<R>,
    window: Duration,
    window_open: AtomicBool,
}

/// Clears the open-window flag when the window closes, even on cancellation.
struct WindowGuard<'a>(&'a AtomicBool);

impl<'a> WindowGuard<'a> {
    fn open(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for WindowGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<R: Radio> ScanController<R> {
    /// Create a controller whose windows last at most `window`.
    pub fn new(radio: Arc<R>, window: Duration) -> Self {
        Self {
            radio,
            window,
            window_open: AtomicBool::new(false),
        }
    }

    /// Whether a discovery window is currently open.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.window_open.load(Ordering::Acquire)
    }

    /// Scan until `address` is discovered or the window expires.
    ///
    /// The radio is asked to report duplicates so the returned handle carries
    /// the freshest advertisement. Scanning is always stopped before this
    /// returns.
    ///
    /// # Errors
    ///
    /// - [`AcquisitionError::Busy`] when another window is already open
    /// - [`AcquisitionError::RadioUnavailable`] when the radio never powers on
    /// - [`AcquisitionError::Scan`] when the radio refuses to scan
    /// - [`AcquisitionError::NotFound`] when the window expires, carrying
    ///   every address seen meanwhile
    #[tracing::instrument(skip(self), fields(%address))]
    pub async fn find(
        &self,
        address: BleAddress,
    ) -> Result<PeripheralHandle<R::Peripheral>, AcquisitionError> {
        let _window = WindowGuard::open(&self.window_open)
            .ok_or(AcquisitionError::Busy(BusyKind::Scanning))?;
        let deadline = Instant::now() + self.window;

        self.wait_powered_on(deadline).await?;

        let mut discoveries = self
            .radio
            .start_scan(&[], true)
            .await
            .map_err(AcquisitionError::Scan)?;
        tracing::debug!("scan started");

        let outcome = watch(&mut discoveries, address, deadline).await;
        drop(discoveries);

        if let Err(err) = self.radio.stop_scan().await {
            tracing::warn!(%err, "failed to stop scan");
        }
        outcome
    }

    /// Wait (at most until `deadline`) for one power state change if the
    /// radio is not ready yet.
    async fn wait_powered_on(&self, deadline: Instant) -> Result<(), AcquisitionError> {
        let current = self.radio.state().await.map_err(AcquisitionError::Scan)?;
        if current == RadioState::PoweredOn {
            return Ok(());
        }

        tracing::info!(state = %current, "waiting for radio to power on");
        match timeout_at(deadline, self.radio.next_state_change()).await {
            Ok(Ok(RadioState::PoweredOn)) => Ok(()),
            Ok(Ok(other)) => Err(AcquisitionError::RadioUnavailable(other)),
            Ok(Err(err)) => Err(AcquisitionError::Scan(err)),
            Err(_) => Err(AcquisitionError::RadioUnavailable(current)),
        }
    }
}

async fn watch<P>(
    discoveries: &mut BoxStream<PeripheralHandle<P>>,
    address: BleAddress,
    deadline: Instant,
) -> Result<PeripheralHandle<P>, AcquisitionError> {
    let mut seen = Vec::new();
    let mut known = HashSet::new();

    loop {
        match timeout_at(deadline, discoveries.next()).await {
            Ok(Some(handle)) if handle.address == address => {
                tracing::debug!(rssi = ?handle.advertisement.rssi, "target discovered");
                return Ok(handle);
            }
            Ok(Some(handle)) => {
                if known.insert(handle.address) {
                    seen.push(handle.address);
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    Err(AcquisitionError::NotFound { address, seen })
}
