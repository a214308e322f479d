//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod radio;
pub mod sink;

pub use radio::{
    BoxStream, DisconnectSignal, PeripheralHandle, Radio, RadioError, RadioPeripheral, RadioState,
    Subscription, WriteMode,
};
pub use sink::{ResultSink, StatusSink};
