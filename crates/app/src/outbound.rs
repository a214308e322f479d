//! In-process outbound channel carrying statuses and readings.

use tokio::sync::mpsc;

use blepoll_domain::reading::ReadingMessage;
use blepoll_domain::status::Status;

use crate::ports::{ResultSink, StatusSink};

/// Everything the core emits, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A status update.
    Status(Status),
    /// A completed reading.
    Reading(ReadingMessage),
}

impl Outbound {
    /// The reading, if this is one.
    #[must_use]
    pub fn as_reading(&self) -> Option<&ReadingMessage> {
        match self {
            Self::Reading(message) => Some(message),
            Self::Status(_) => None,
        }
    }

    /// The status, if this is one.
    #[must_use]
    pub fn as_status(&self) -> Option<&Status> {
        match self {
            Self::Status(status) => Some(status),
            Self::Reading(_) => None,
        }
    }
}

/// Status and result sink backed by an unbounded tokio [`mpsc`] channel.
///
/// Sending succeeds even when the receiver is gone (the item is simply
/// dropped), so a closed consumer never stalls a session.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    /// Create a sink and the receiver draining it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl StatusSink for ChannelSink {
    fn report(&self, status: Status) {
        tracing::debug!(%status, "status");
        let _ = self.sender.send(Outbound::Status(status));
    }
}

impl ResultSink for ChannelSink {
    fn deliver(&self, message: ReadingMessage) {
        let _ = self.sender.send(Outbound::Reading(message));
    }
}

#[cfg(test)]
mod tests {
    use blepoll_domain::family::DeviceFamily;
    use blepoll_domain::reading::{Contribution, Reading, now};

    use super::*;

    #[tokio::test]
    async fn should_preserve_emission_order() {
        let (sink, mut rx) = ChannelSink::new();

        let mut payload = Reading::default();
        payload.apply(Contribution::Battery(42));
        sink.report(Status::requesting());
        sink.deliver(ReadingMessage {
            payload,
            address: "c4:7c:8d:6a:12:34".parse().unwrap(),
            family: DeviceFamily::SoilSensor,
            read_at: now(),
        });
        sink.report(Status::cleared());

        assert_eq!(
            rx.recv().await.unwrap().as_status(),
            Some(&Status::requesting())
        );
        let reading = rx.recv().await.unwrap();
        assert_eq!(reading.as_reading().unwrap().payload.battery, Some(42));
        assert!(rx.recv().await.unwrap().as_status().unwrap().is_cleared());
    }

    #[test]
    fn should_not_fail_without_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.report(Status::no_data());
    }
}
