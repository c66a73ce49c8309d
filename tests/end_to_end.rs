//! Black-box coverage of a couple of end-to-end scenarios that unit tests
//! inside the crate can't reach because they cross the session/transport
//! boundary: LED player-number encoding and the pairing handshake's wire
//! bytes. Uses the same auto-acking mock transport shape as the teacher's
//! `MockTransport` in `command.rs`'s own tests.

use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;
use std::sync::Mutex;
use switch2_bridge::buttons::ButtonEncoding;
use switch2_bridge::error::TransportError;
use switch2_bridge::session::{DeviceKind, DeviceSession};
use switch2_bridge::transport::{Channel, Transport};

/// Immediately acknowledges every command write so `CommandChannel::send`
/// resolves without a real device on the other end. `CommandChannel` only
/// ever has one command outstanding at a time, so a single slot for the
/// latest ack is enough to serve the sequential sends these tests issue.
struct AckingTransport {
    written: Mutex<Vec<Vec<u8>>>,
    last_response: Mutex<Option<Receiver<Vec<u8>>>>,
}

impl AckingTransport {
    fn new() -> Self {
        Self { written: Mutex::new(Vec::new()), last_response: Mutex::new(None) }
    }
}

#[async_trait]
impl Transport for AckingTransport {
    async fn write(&self, channel: Channel, payload: &[u8]) -> Result<(), TransportError> {
        self.written.lock().unwrap().push(payload.to_vec());
        if channel == Channel::Command {
            let mut ack = vec![payload[0], 0x01, 0, 0, 0, 0, 0, 0];
            ack.resize(8, 0);
            let (tx, rx) = bounded(1);
            tx.send(ack).unwrap();
            *self.last_response.lock().unwrap() = Some(rx);
        }
        Ok(())
    }

    fn input_reports(&self) -> Receiver<Vec<u8>> {
        bounded(1).1
    }

    fn command_responses(&self) -> Receiver<Vec<u8>> {
        self.last_response.lock().unwrap().clone().expect("a command was written before a response was awaited")
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test]
async fn led_reverse_for_player_three_on_lone_right_joycon_writes_0x0e() {
    let transport = Arc::new(AckingTransport::new());
    let session = DeviceSession::new(transport.clone(), DeviceKind::JoyconRight, ButtonEncoding::Ble, 150);

    session.set_leds(3, true).await.unwrap();

    let written = transport.written.lock().unwrap();
    assert_eq!(written[0][0], 0x09, "LED command id");
    assert_eq!(written[0][3], 0x07, "set-player-LEDs subcommand id");
    assert_eq!(written[0][8] & 0x0F, 0x0E, "reverse_bits(led_pattern(3), 4)");
}

#[tokio::test]
async fn pairing_sends_duplicated_local_mac_and_both_ltks() {
    let transport = Arc::new(AckingTransport::new());
    let session = DeviceSession::new(transport.clone(), DeviceKind::JoyconLeft, ButtonEncoding::Ble, 150);
    let mac = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

    session.pair(mac).await.unwrap();

    let written = transport.written.lock().unwrap();
    assert_eq!(written.len(), 4, "expected set-mac, ltk1, ltk2, finish");

    let set_mac_payload = &written[0][8..];
    assert_eq!(&set_mac_payload[2..8], &mac, "first copy of the local MAC");
    assert_eq!(&set_mac_payload[8..14], &mac, "second, duplicated copy of the local MAC");

    assert_eq!(written[1][0], 0x15, "LTK1 command id");
    assert_eq!(written[2][0], 0x15, "LTK2 command id");
    assert_eq!(written[3][0], 0x15, "pair-finish command id");
}
