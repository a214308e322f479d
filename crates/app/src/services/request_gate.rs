//! Request gate — the per-device state machine serialising scans and sessions.
//!
//! The gate runs as a single tokio task owning all per-device state (cached
//! peripheral, scan flag, request flag). Requests and internal completions
//! reach it over channels, so no locks are involved and every transition
//! happens in one place.
//!
//! ```text
//!            request                 scan ok
//!   Idle ──────────────▶ ScanActive ─────────▶ RequestActive ──▶ Idle
//!     │   (nothing cached)    │ not found           ▲   session done
//!     │                       ▼                     │
//!     │                     Idle                    │
//!     └─────────────────────────────────────────────┘
//!                  request (peripheral cached)
//! ```
//!
//! Overlapping requests are rejected with a status, never queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use blepoll_domain::address::BleAddress;
use blepoll_domain::family::{Classifier, DeviceFamily};
use blepoll_domain::request::Request;
use blepoll_domain::status::Status;

use crate::error::{AcquisitionError, BusyKind};
use crate::latch::OnceLatch;
use crate::ports::{PeripheralHandle, Radio, RadioPeripheral, ResultSink, StatusSink};
use crate::services::scan_controller::ScanController;
use crate::services::session::{AcquisitionSession, SessionConfig, SessionOutcome};

/// Static settings of a gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Address polled when a request does not name one.
    pub default_address: Option<BleAddress>,
    /// Bound on each discovery window.
    pub scan_window: Duration,
    /// Session timers.
    pub session: SessionConfig,
    /// Family selection rules.
    pub classifier: Classifier,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_address: None,
            scan_window: Duration::from_secs(10),
            session: SessionConfig::default(),
            classifier: Classifier::default(),
        }
    }
}

/// A discovered peripheral remembered between requests.
#[derive(Debug, Clone)]
pub struct CachedPeripheral<P> {
    /// Handle returned by the scan.
    pub handle: PeripheralHandle<P>,
    /// Family chosen for it.
    pub family: DeviceFamily,
}

/// What to do with one inbound request.
#[derive(Debug)]
pub enum Plan<P> {
    /// Reuse the cached peripheral.
    Acquire(CachedPeripheral<P>),
    /// Open a discovery window for this address.
    Scan(BleAddress),
    /// Refuse the request.
    Reject(AcquisitionError),
}

/// Per-device state: the cached handle and the two busy flags.
#[derive(Debug)]
pub struct GateState<P> {
    cached: Option<CachedPeripheral<P>>,
    scan_in_progress: bool,
    request_in_progress: bool,
}

impl<P> Default for GateState<P> {
    fn default() -> Self {
        Self {
            cached: None,
            scan_in_progress: false,
            request_in_progress: false,
        }
    }
}

impl<P: Clone> GateState<P> {
    /// Decide how to serve `request`.
    ///
    /// A request overlapping a running session is refused before anything
    /// else. The cached peripheral is dropped when the request asks for a
    /// rescan, targets another address, or the cached device only
    /// broadcasts. A request with no address at all reuses the cache.
    /// Choosing [`Plan::Scan`] marks the scan as in progress.
    pub fn plan(&mut self, request: &Request, default_address: Option<BleAddress>) -> Plan<P> {
        if self.request_in_progress {
            return Plan::Reject(AcquisitionError::Busy(BusyKind::Requesting));
        }
        let target = match request.address() {
            Some(raw) => match raw.parse::<BleAddress>() {
                Ok(address) => Some(address),
                Err(err) => return Plan::Reject(err.into()),
            },
            None => default_address,
        };

        let stale = self.cached.as_ref().is_some_and(|cached| {
            request.scan
                || target.is_some_and(|address| address != cached.handle.address)
                || cached.family.requires_fresh_scan()
        });
        if stale {
            tracing::debug!("dropping cached peripheral");
            self.cached = None;
        }

        if let Some(cached) = &self.cached {
            return Plan::Acquire(cached.clone());
        }
        if self.scan_in_progress {
            return Plan::Reject(AcquisitionError::Busy(BusyKind::Scanning));
        }
        match target {
            Some(address) => {
                self.scan_in_progress = true;
                Plan::Scan(address)
            }
            None => Plan::Reject(AcquisitionError::MissingAddress),
        }
    }

    /// Mark a session as in flight.
    ///
    /// # Errors
    ///
    /// Returns [`BusyKind::Requesting`] when one already is.
    pub fn begin_request(&mut self) -> Result<(), AcquisitionError> {
        if self.request_in_progress {
            return Err(AcquisitionError::Busy(BusyKind::Requesting));
        }
        self.request_in_progress = true;
        Ok(())
    }

    /// Record the end of a session.
    pub fn end_request(&mut self) {
        self.request_in_progress = false;
    }

    /// Record a scan result, caching the peripheral when one was found.
    pub fn end_scan(&mut self, found: Option<CachedPeripheral<P>>) {
        self.scan_in_progress = false;
        if found.is_some() {
            self.cached = found;
        }
    }

    /// The cached peripheral, if any.
    #[must_use]
    pub fn cached(&self) -> Option<&CachedPeripheral<P>> {
        self.cached.as_ref()
    }

    /// Whether a discovery window is open.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scan_in_progress
    }

    /// Whether a session is in flight.
    #[must_use]
    pub fn is_requesting(&self) -> bool {
        self.request_in_progress
    }
}

// ── Actor ─────────────────────────────────────────────────────────

enum Command {
    Request(Request),
    Close(oneshot::Sender<()>),
}

enum Internal<P> {
    ScanFinished(Result<PeripheralHandle<P>, AcquisitionError>),
    SessionFinished(SessionOutcome),
}

struct InFlight<P> {
    task: JoinHandle<()>,
    latch: Arc<OnceLatch>,
    peripheral: P,
    family: DeviceFamily,
}

/// Cloneable handle used to submit requests to a running gate.
#[derive(Debug, Clone)]
pub struct GateHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl GateHandle {
    /// Submit a request. Returns `false` once the gate has shut down.
    pub fn request(&self, request: Request) -> bool {
        self.commands.send(Command::Request(request)).is_ok()
    }

    /// Close the gate: abort scans and sessions, stop scanning, report a
    /// cleared status. Resolves once the gate has shut down.
    pub async fn close(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Close(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

/// The gate task.
pub struct RequestGate<R: Radio, S> {
    radio: Arc<R>,
    scanner: Arc<ScanController<R>>,
    sink: S,
    config: GateConfig,
    state: GateState<R::Peripheral>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Internal<R::Peripheral>>,
    events: mpsc::UnboundedReceiver<Internal<R::Peripheral>>,
    scan_task: Option<JoinHandle<()>>,
    session: Option<InFlight<R::Peripheral>>,
}

impl<R, S> RequestGate<R, S>
where
    R: Radio,
    S: StatusSink + ResultSink + Clone,
{
    /// Spawn a gate on the current runtime.
    ///
    /// The gate stops when [`GateHandle::close`] is called or every handle
    /// is dropped.
    pub fn spawn(radio: Arc<R>, sink: S, config: GateConfig) -> (GateHandle, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let scanner = Arc::new(ScanController::new(Arc::clone(&radio), config.scan_window));

        let gate = Self {
            radio,
            scanner,
            sink,
            config,
            state: GateState::default(),
            commands,
            events_tx,
            events,
            scan_task: None,
            session: None,
        };
        let task = tokio::spawn(gate.run());
        (
            GateHandle {
                commands: commands_tx,
            },
            task,
        )
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Request(request)) => self.handle_request(&request),
                    Some(Command::Close(ack)) => {
                        self.close().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.close().await;
                        return;
                    }
                },
                Some(event) = self.events.recv() => self.handle_event(event),
            }
        }
    }

    #[tracing::instrument(skip(self))]
    fn handle_request(&mut self, request: &Request) {
        match self.state.plan(request, self.config.default_address) {
            Plan::Acquire(cached) => self.start_session(cached),
            Plan::Scan(address) => self.start_scan(address),
            Plan::Reject(err) => {
                tracing::info!(%err, "request rejected");
                self.sink.report(err.status());
            }
        }
    }

    fn start_scan(&mut self, address: BleAddress) {
        tracing::info!(%address, "searching");
        self.sink.report(Status::searching());

        let scanner = Arc::clone(&self.scanner);
        let events = self.events_tx.clone();
        self.scan_task = Some(tokio::spawn(async move {
            let result = scanner.find(address).await;
            let _ = events.send(Internal::ScanFinished(result));
        }));
    }

    fn start_session(&mut self, cached: CachedPeripheral<R::Peripheral>) {
        if let Err(err) = self.state.begin_request() {
            tracing::info!(%err, "request rejected");
            self.sink.report(err.status());
            return;
        }
        tracing::info!(address = %cached.handle.address, family = %cached.family, "requesting");
        self.sink.report(Status::requesting());

        let peripheral = cached.handle.peripheral.clone();
        let session = AcquisitionSession::new(
            cached.handle,
            cached.family,
            self.config.session,
            self.sink.clone(),
        );
        let latch = session.latch();
        let events = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let outcome = session.run().await;
            let _ = events.send(Internal::SessionFinished(outcome));
        });

        self.session = Some(InFlight {
            task,
            latch,
            peripheral,
            family: cached.family,
        });
    }

    fn handle_event(&mut self, event: Internal<R::Peripheral>) {
        match event {
            Internal::ScanFinished(Ok(handle)) => {
                self.scan_task = None;
                let family = self
                    .config
                    .classifier
                    .classify(handle.address, &handle.advertisement);
                tracing::info!(address = %handle.address, %family, "peripheral found");
                let cached = CachedPeripheral { handle, family };
                self.state.end_scan(Some(cached.clone()));
                self.start_session(cached);
            }
            Internal::ScanFinished(Err(err)) => {
                self.scan_task = None;
                self.state.end_scan(None);
                match &err {
                    AcquisitionError::NotFound { address, seen } => {
                        let seen: Vec<String> = seen.iter().map(ToString::to_string).collect();
                        tracing::error!(%address, ?seen, "peripheral not found");
                    }
                    other => tracing::warn!(err = %other, "scan failed"),
                }
                self.sink.report(err.status());
            }
            Internal::SessionFinished(outcome) => {
                tracing::debug!(?outcome, "session finished");
                self.session = None;
                self.state.end_request();
            }
        }
    }

    async fn close(&mut self) {
        tracing::info!("closing");
        if let Some(task) = self.scan_task.take() {
            task.abort();
            if let Err(err) = self.radio.stop_scan().await {
                tracing::warn!(%err, "failed to stop scan on close");
            }
        }

        if let Some(in_flight) = self.session.take() {
            if in_flight.latch.try_fire() {
                in_flight.task.abort();
                if in_flight.family.needs_connection()
                    && let Err(err) = in_flight.peripheral.disconnect().await
                {
                    tracing::debug!(%err, "disconnect on close failed");
                }
            } else {
                // already finalizing: let it emit its outcome
                let _ = in_flight.task.await;
            }
        }

        self.state = GateState::default();
        self.sink.report(Status::cleared());
    }
}
