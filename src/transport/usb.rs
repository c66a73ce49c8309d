//! Wired USB HID transport for the Pro Controller 2, grounded in
//! `examples/original_source/procon2_usb.py`: same command framing as BLE,
//! reached over `hidapi` bulk reports instead of GATT, with a one-byte HID
//! report-ID prefix stripped from every inbound report.

use super::{Channel, Transport};
use crate::error::TransportError;
use crate::protocol::{NINTENDO_VENDOR_ID, PRODUCT_ID_PRO_CONTROLLER2};
use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, Sender};
use hidapi::{HidApi, HidDevice};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Look for a wired Pro Controller 2 and open it, matching
/// `examples/original_source/procon2_usb.py`'s fixed vendor/product id
/// lookup. Returns `None` (not an error) if none is plugged in.
pub fn find_pro_controller2() -> Result<Option<HidDevice>, TransportError> {
    let api = HidApi::new().map_err(|e| TransportError::Connect(e.to_string()))?;
    let present = api
        .device_list()
        .any(|d| d.vendor_id() == NINTENDO_VENDOR_ID && d.product_id() == PRODUCT_ID_PRO_CONTROLLER2);
    if !present {
        return Ok(None);
    }
    let device = api
        .open(NINTENDO_VENDOR_ID, PRODUCT_ID_PRO_CONTROLLER2)
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    Ok(Some(device))
}

pub struct UsbTransport {
    device: Mutex<HidDevice>,
    input_rx: Receiver<Vec<u8>>,
    response_rx: Receiver<Vec<u8>>,
}

impl UsbTransport {
    /// Wrap an already-opened HID device and spawn a blocking reader thread
    /// that demultiplexes reports into the input/response channels. The
    /// Pro Controller 2 does not distinguish input-report notifications from
    /// command-response notifications at the USB framing level the way BLE
    /// does with separate characteristics; both arrive on the same endpoint,
    /// so every report is published to both channels and callers filter by
    /// length/opcode, matching `procon2_usb.py`'s single blocking read loop.
    pub fn new(device: HidDevice) -> Result<Self, TransportError> {
        let (input_tx, input_rx) = bounded::<Vec<u8>>(64);
        let (response_tx, response_rx): (Sender<Vec<u8>>, Receiver<Vec<u8>>) = bounded(64);

        let reader_device = device
            .try_clone()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        thread::spawn(move || loop {
            let mut buf = [0u8; 64];
            match reader_device.read_timeout(&mut buf, 1000) {
                Ok(0) => continue,
                Ok(n) => {
                    // strip the one-byte HID report-ID prefix
                    if n < 2 {
                        continue;
                    }
                    let report = buf[1..n].to_vec();
                    if input_tx.send(report.clone()).is_err() {
                        break;
                    }
                    let _ = response_tx.send(report);
                }
                Err(_) => break,
            }
        });

        Ok(Self {
            device: Mutex::new(device),
            input_rx,
            response_rx,
        })
    }
}

#[async_trait]
impl Transport for UsbTransport {
    async fn write(&self, _channel: Channel, payload: &[u8]) -> Result<(), TransportError> {
        let device = self.device.lock().expect("usb device mutex poisoned");
        device
            .write(payload)
            .map_err(|e| TransportError::Write(e.to_string()))?;
        Ok(())
    }

    fn input_reports(&self) -> Receiver<Vec<u8>> {
        self.input_rx.clone()
    }

    fn command_responses(&self) -> Receiver<Vec<u8>> {
        self.response_rx.clone()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        // hidapi has no explicit disconnect; dropping the handle closes it.
        Ok(())
    }
}

/// Hold off briefly after writing the USB init sequence, mirroring the
/// fixed inter-command pacing the teacher's BLE path uses
/// (`COMMAND_DELAY_MS`).
pub const USB_COMMAND_DELAY: Duration = Duration::from_millis(50);
