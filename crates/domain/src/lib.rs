//! # blepoll-domain
//!
//! Pure domain model for polling low-power BLE environmental sensors.
//!
//! ## Responsibilities
//! - Foundational types: [`BleAddress`](address::BleAddress), advertisement
//!   snapshots, timestamps
//! - The [`Reading`](reading::Reading) accumulator and the outbound
//!   [`ReadingMessage`](reading::ReadingMessage)
//! - The closed set of supported [`DeviceFamily`](family::DeviceFamily)
//!   values and the classifier that picks one from advertisement data
//! - The three payload [`codec`]s (notify, soil, broadcast)
//! - Operator-facing [`Status`](status::Status) updates
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod address;
pub mod advertisement;
pub mod codec;
pub mod error;
pub mod family;
pub mod reading;
pub mod request;
pub mod status;
