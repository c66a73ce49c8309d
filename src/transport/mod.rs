//! Byte-level link abstraction shared by the BLE and USB device sessions.
//!
//! A [`Transport`] only knows how to write a characteristic/endpoint and
//! deliver notifications; framing, command correlation, and protocol
//! semantics live one layer up in [`crate::command`] and [`crate::session`].

pub mod ble;
pub mod usb;

use crate::error::TransportError;
use async_trait::async_trait;
use crossbeam_channel::Receiver;

/// Which logical channel a write targets or a notification arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Command,
    Vibration,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Write a payload to the given logical channel without waiting for an
    /// acknowledgment at the transport level (acknowledgment, if any, is a
    /// notification delivered separately).
    async fn write(&self, channel: Channel, payload: &[u8]) -> Result<(), TransportError>;

    /// Receiver for decoded input-report notifications.
    fn input_reports(&self) -> Receiver<Vec<u8>>;

    /// Receiver for command-response notifications.
    fn command_responses(&self) -> Receiver<Vec<u8>>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
