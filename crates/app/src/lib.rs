//! # blepoll-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `Radio` / `RadioPeripheral` — scan, connect, read, write, subscribe
//!   - `StatusSink` / `ResultSink` — where status updates and readings go
//! - Provide the use-cases:
//!   - `ScanController` — bounded discovery window for one address
//!   - `AcquisitionSession` — one peripheral in, exactly one outcome out
//!   - `RequestGate` — per-device state machine serialising scans and sessions
//! - Provide **in-process infrastructure** (channel sink, one-shot latch)
//!
//! ## Dependency rule
//! Depends on `blepoll-domain` only (plus `tokio` for tasks, timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod error;
pub mod latch;
pub mod outbound;
pub mod ports;
pub mod services;

#[cfg(test)]
mod testing;
