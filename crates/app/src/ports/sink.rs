//! Outbound ports — where status updates and finished readings go.

use std::sync::Arc;

use blepoll_domain::reading::ReadingMessage;
use blepoll_domain::status::Status;

/// Receives discrete status updates.
pub trait StatusSink: Send + Sync + 'static {
    /// Publish a status update. Must not block.
    fn report(&self, status: Status);
}

/// Receives completed readings.
pub trait ResultSink: Send + Sync + 'static {
    /// Forward one reading downstream. Must not block.
    fn deliver(&self, message: ReadingMessage);
}

impl<T: StatusSink + ?Sized> StatusSink for Arc<T> {
    fn report(&self, status: Status) {
        (**self).report(status);
    }
}

impl<T: ResultSink + ?Sized> ResultSink for Arc<T> {
    fn deliver(&self, message: ReadingMessage) {
        (**self).deliver(message);
    }
}
