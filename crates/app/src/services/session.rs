//! Acquisition session — one matched peripheral in, exactly one outcome out.
//!
//! A session connects (unless the family only broadcasts), runs the two
//! sub-operations of its family concurrently and finalizes on whichever
//! comes first:
//!
//! 1. every sub-operation contributed to the reading,
//! 2. the peripheral disconnected,
//! 3. the watchdog fired.
//!
//! Finalizing is guarded by a [`OnceLatch`]: it disconnects, drops the
//! watchdog, detaches remaining listeners and emits either the reading or a
//! `no data` status. Nothing is emitted twice.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::Sleep;

use blepoll_domain::family::DeviceFamily;
use blepoll_domain::reading::{Contribution, Reading, ReadingMessage, now};
use blepoll_domain::status::Status;

use crate::error::AcquisitionError;
use crate::latch::OnceLatch;
use crate::ports::{DisconnectSignal, PeripheralHandle, RadioPeripheral, ResultSink, StatusSink};
use crate::services::protocol::SubOperation;

/// Timers bounding a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Forces finalization when the session does not complete in time.
    pub watchdog: Duration,
    /// Detaches a notification listener that never fired.
    pub listener_expiry: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_secs(30),
            listener_expiry: Duration::from_secs(30),
        }
    }
}

/// What triggered finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every sub-operation contributed.
    AllReceived,
    /// The peripheral dropped the connection.
    Disconnected,
    /// The watchdog fired first.
    WatchdogExpired,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Finalized; `delivered` tells whether a reading was emitted.
    Finalized {
        /// What triggered finalization.
        completion: Completion,
        /// `false` when a `no data` status was emitted instead.
        delivered: bool,
    },
    /// The connection could not be established.
    ConnectFailed,
    /// Someone else claimed the latch first (the gate closed); nothing was
    /// emitted by the session.
    Superseded,
}

type OpResult = (SubOperation, Result<Contribution, AcquisitionError>);

/// State owned by one acquisition.
pub struct AcquisitionSession<P, S> {
    handle: PeripheralHandle<P>,
    family: DeviceFamily,
    config: SessionConfig,
    sink: S,
    latch: Arc<OnceLatch>,
    reading: Reading,
    outstanding: usize,
}

impl<P, S> AcquisitionSession<P, S>
where
    P: RadioPeripheral,
    S: StatusSink + ResultSink,
{
    /// Prepare a session for a classified peripheral.
    pub fn new(
        handle: PeripheralHandle<P>,
        family: DeviceFamily,
        config: SessionConfig,
        sink: S,
    ) -> Self {
        Self {
            handle,
            family,
            config,
            sink,
            latch: Arc::new(OnceLatch::new()),
            reading: Reading::default(),
            outstanding: 0,
        }
    }

    /// The finalize latch, shared with whoever may need to pre-empt the
    /// session.
    #[must_use]
    pub fn latch(&self) -> Arc<OnceLatch> {
        Arc::clone(&self.latch)
    }

    /// Drive the session to its single outcome.
    #[tracing::instrument(skip(self), fields(address = %self.handle.address, family = %self.family))]
    pub async fn run(mut self) -> SessionOutcome {
        let mut watchdog = Box::pin(tokio::time::sleep(self.config.watchdog));
        let disconnected = self.disconnect_signal().await;

        if self.family.needs_connection() {
            let connected = tokio::select! {
                result = self.handle.peripheral.connect() => Some(result),
                () = &mut watchdog => None,
            };
            match connected {
                Some(Ok(())) => tracing::debug!("connected"),
                Some(Err(err)) => {
                    drop(watchdog);
                    if !self.latch.try_fire() {
                        return SessionOutcome::Superseded;
                    }
                    let err = AcquisitionError::Connection(err);
                    tracing::warn!(%err, "connection failed");
                    self.sink.report(err.status());
                    return SessionOutcome::ConnectFailed;
                }
                None => {
                    return self
                        .finalize(Completion::WatchdogExpired, JoinSet::new(), watchdog)
                        .await;
                }
            }
        }

        let ops = self.dispatch();
        self.collect(ops, disconnected, watchdog).await
    }

    async fn disconnect_signal(&self) -> DisconnectSignal {
        if !self.family.needs_connection() {
            return Box::pin(std::future::pending());
        }
        match self.handle.peripheral.disconnect_signal().await {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(%err, "cannot watch for disconnection");
                Box::pin(std::future::pending())
            }
        }
    }

    fn dispatch(&mut self) -> JoinSet<OpResult> {
        let mut ops = JoinSet::new();
        for op in SubOperation::for_family(self.family) {
            let peripheral = self.handle.peripheral.clone();
            let captured = self.handle.advertisement.clone();
            let expiry = self.config.listener_expiry;
            ops.spawn(async move { (op, op.run(&peripheral, &captured, expiry).await) });
            self.outstanding += 1;
        }
        ops
    }

    async fn collect(
        mut self,
        mut ops: JoinSet<OpResult>,
        mut disconnected: DisconnectSignal,
        mut watchdog: Pin<Box<Sleep>>,
    ) -> SessionOutcome {
        let completion = loop {
            tokio::select! {
                Some(joined) = ops.join_next(), if !ops.is_empty() => {
                    if self.absorb(joined) {
                        break Completion::AllReceived;
                    }
                }
                () = &mut disconnected => break Completion::Disconnected,
                () = &mut watchdog => break Completion::WatchdogExpired,
            }
        };
        self.finalize(completion, ops, watchdog).await
    }

    /// Merge one finished sub-operation; `true` once nothing is outstanding.
    fn absorb(&mut self, joined: Result<OpResult, JoinError>) -> bool {
        match joined {
            Ok((op, Ok(contribution))) => {
                tracing::debug!(?op, ?contribution, "sub-operation completed");
                self.reading.apply(contribution);
                self.outstanding = self.outstanding.saturating_sub(1);
                self.outstanding == 0
            }
            Ok((op, Err(err))) => {
                if matches!(err, AcquisitionError::Decode(_)) {
                    tracing::error!(?op, %err, "unrecognised payload");
                } else {
                    tracing::warn!(?op, %err, "sub-operation failed");
                }
                self.sink.report(err.status());
                false
            }
            Err(err) => {
                if !err.is_cancelled() {
                    tracing::warn!(%err, "sub-operation task failed");
                }
                false
            }
        }
    }

    async fn finalize(
        &mut self,
        completion: Completion,
        mut ops: JoinSet<OpResult>,
        watchdog: Pin<Box<Sleep>>,
    ) -> SessionOutcome {
        drop(watchdog);
        if !self.latch.try_fire() {
            return SessionOutcome::Superseded;
        }

        ops.abort_all();
        while ops.join_next().await.is_some() {}

        if self.family.needs_connection()
            && let Err(err) = self.handle.peripheral.disconnect().await
        {
            tracing::debug!(%err, "disconnect after finalize failed");
        }

        if self.reading.is_empty() {
            tracing::info!(?completion, "session finished without data");
            self.sink.report(Status::no_data());
            return SessionOutcome::Finalized {
                completion,
                delivered: false,
            };
        }

        let message = ReadingMessage {
            payload: std::mem::take(&mut self.reading),
            address: self.handle.address,
            family: self.family,
            read_at: now(),
        };
        tracing::info!(?completion, reading = ?message.payload, "reading delivered");
        self.sink.deliver(message);
        self.sink.report(Status::cleared());
        SessionOutcome::Finalized {
            completion,
            delivered: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use blepoll_domain::advertisement::Advertisement;
    use blepoll_domain::codec::{broadcast, notify};
    use blepoll_domain::status::Severity;

    use super::*;
    use crate::outbound::{ChannelSink, Outbound};
    use crate::testing::FakePeripheral;

    const ADDRESS: &str = "4c:65:a8:d0:ae:64";

    fn config() -> SessionConfig {
        SessionConfig {
            watchdog: Duration::from_secs(5),
            listener_expiry: Duration::from_secs(30),
        }
    }

    fn notifying_sensor() -> FakePeripheral {
        FakePeripheral::default()
            .with_read(notify::BATTERY.handle, &[87])
            .with_characteristic(notify::TEXT_CHAR)
            .with_notification(b"T=24.5 H=55.0\0")
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn should_deliver_reading_once_everything_contributed() {
        let (sink, mut rx) = ChannelSink::new();
        let handle = notifying_sensor().handle(ADDRESS, Advertisement::default());
        let session = AcquisitionSession::new(handle, DeviceFamily::NotifySensor, config(), sink);

        let outcome = session.run().await;

        assert_eq!(
            outcome,
            SessionOutcome::Finalized {
                completion: Completion::AllReceived,
                delivered: true
            }
        );
        let out = drain(&mut rx);
        assert_eq!(out.len(), 2);
        let reading = out[0].as_reading().unwrap();
        assert_eq!(reading.payload.battery, Some(87));
        assert_eq!(reading.payload.temperature, Some(24.5));
        assert!(out[1].as_status().unwrap().is_cleared());
    }

    #[tokio::test(start_paused = true)]
    async fn should_detach_listener_when_finalized() {
        let (sink, _rx) = ChannelSink::new();
        let peripheral = notifying_sensor();
        let unsubscribes = Arc::clone(&peripheral.inner.unsubscribes);
        let handle = peripheral.handle(ADDRESS, Advertisement::default());

        AcquisitionSession::new(handle, DeviceFamily::NotifySensor, config(), sink)
            .run()
            .await;

        assert_eq!(unsubscribes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_no_data_when_watchdog_fires() {
        let (sink, mut rx) = ChannelSink::new();
        let handle = FakePeripheral::default().handle(ADDRESS, Advertisement::default());
        let session = AcquisitionSession::new(handle, DeviceFamily::NotifySensor, config(), sink);
        let started = tokio::time::Instant::now();

        let outcome = session.run().await;

        assert_eq!(
            outcome,
            SessionOutcome::Finalized {
                completion: Completion::WatchdogExpired,
                delivered: false
            }
        );
        assert!(started.elapsed() >= Duration::from_secs(5));
        let out = drain(&mut rx);
        assert!(out.iter().all(|message| message.as_reading().is_none()));
        let errors = out
            .iter()
            .filter_map(Outbound::as_status)
            .filter(|status| status.severity == Severity::Error)
            .count();
        // battery read, discovery, then the terminal status
        assert_eq!(errors, 3);
        assert_eq!(out.last().and_then(Outbound::as_status), Some(&Status::no_data()));
    }

    #[tokio::test(start_paused = true)]
    async fn should_stay_silent_when_latch_already_claimed() {
        let (sink, mut rx) = ChannelSink::new();
        let handle = notifying_sensor().handle(ADDRESS, Advertisement::default());
        let session = AcquisitionSession::new(handle, DeviceFamily::NotifySensor, config(), sink);
        assert!(session.latch().try_fire());

        let outcome = session.run().await;

        assert_eq!(outcome, SessionOutcome::Superseded);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_read_broadcast_sensor_from_captured_advertisement() {
        let (sink, mut rx) = ChannelSink::new();
        let mut captured = Advertisement::default();
        captured.service_data.insert(
            broadcast::SERVICE_DATA_TAG,
            vec![
                0x08, 0x07, 0x45, 0x38, 0x10, 0x34, 0x2d, 0x58, 0x01, 0x04, 0xf5, 0x00, 0xda,
                0x02, 0x02, 0x01, 0x45,
            ],
        );
        let handle = FakePeripheral::default().handle("58:2d:34:10:38:45", captured);
        let session =
            AcquisitionSession::new(handle, DeviceFamily::BroadcastSensor, config(), sink);

        let outcome = session.run().await;

        assert!(matches!(
            outcome,
            SessionOutcome::Finalized {
                delivered: true,
                ..
            }
        ));
        let out = drain(&mut rx);
        let reading = out[0].as_reading().unwrap();
        assert_eq!(reading.payload.humidity, Some(73.0));
        assert_eq!(reading.payload.battery, Some(69));
    }
}
