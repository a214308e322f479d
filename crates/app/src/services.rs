//! Application services — use-case implementations.
//!
//! Each service accepts port trait implementations via generic parameters
//! (constructor injection), keeping this layer decoupled from concrete adapters.

pub mod protocol;
pub mod request_gate;
pub mod scan_controller;
pub mod session;
