//! # blepoll-adapter-btleplug
//!
//! Real BLE radio — drives the host Bluetooth adapter through
//! [btleplug](https://docs.rs/btleplug).
//!
//! ## How it works
//!
//! [`BtleplugRadio`] opens the first adapter the platform reports and
//! implements the [`Radio`](blepoll_app::ports::Radio) port: power state,
//! filtered scans and discovery reports. Each report carries a
//! [`BtleplugPeripheral`] implementing
//! [`RadioPeripheral`](blepoll_app::ports::RadioPeripheral): connection,
//! GATT reads and writes, notifications and follow-up advertisements.
//!
//! On platforms that hide hardware addresses (CoreBluetooth), the address is
//! recovered from the advertised broadcast block or MiBeacon frame.
//!
//! ## Dependency rule
//!
//! Depends on `blepoll-app` (port traits) and `blepoll-domain` only.

mod address;
mod error;
mod peripheral;
mod radio;

pub use error::BtleplugError;
pub use peripheral::BtleplugPeripheral;
pub use radio::BtleplugRadio;
