//! BLE GATT transport, built on `btleplug`. Grounded in the teacher's
//! `joycon2::connection::JoyConConnection` (characteristic discovery,
//! subscribe-then-write ordering, `WithoutResponse` writes).

use super::{Channel, Transport};
use crate::error::TransportError;
use crate::protocol::{
    CHAR_COMMAND_RESPONSE, CHAR_COMMAND_WRITE, CHAR_INPUT_REPORT, CHAR_VIBRATION_LEFT,
    CHAR_VIBRATION_PRO_CONTROLLER2, CHAR_VIBRATION_RIGHT,
};
use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use crossbeam_channel::{bounded, Receiver};
use futures::StreamExt;
use std::collections::BTreeSet;

/// Which vibration characteristic a device uses; resolved once at connect
/// time from the device's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VibrationTarget {
    JoyconLeft,
    JoyconRight,
    ProController2,
}

pub struct BleTransport {
    peripheral: Peripheral,
    command_char: Characteristic,
    vibration_char: Characteristic,
    input_rx: Receiver<Vec<u8>>,
    response_rx: Receiver<Vec<u8>>,
}

impl BleTransport {
    /// Discover services, locate the four well-known characteristics, and
    /// spawn a background task relaying notifications into the two receiver
    /// channels. Mirrors `JoyConConnection::connect` + `initialize`.
    pub async fn connect(
        peripheral: Peripheral,
        vibration_target: VibrationTarget,
    ) -> Result<Self, TransportError> {
        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: uuid::Uuid| -> Result<Characteristic, TransportError> {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| TransportError::Connect(format!("missing characteristic {uuid}")))
        };

        let command_char = find(CHAR_COMMAND_WRITE)?;
        let response_char = find(CHAR_COMMAND_RESPONSE)?;
        let input_char = find(CHAR_INPUT_REPORT)?;
        let vibration_uuid = match vibration_target {
            VibrationTarget::JoyconLeft => CHAR_VIBRATION_LEFT,
            VibrationTarget::JoyconRight => CHAR_VIBRATION_RIGHT,
            VibrationTarget::ProController2 => CHAR_VIBRATION_PRO_CONTROLLER2,
        };
        let vibration_char = find(vibration_uuid)?;

        peripheral
            .subscribe(&response_char)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        peripheral
            .subscribe(&input_char)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (input_tx, input_rx) = bounded(64);
        let (response_tx, response_rx) = bounded(16);

        let notify_uuids: BTreeSet<uuid::Uuid> =
            [input_char.uuid, response_char.uuid].into_iter().collect();
        let mut stream = peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let input_tx_task = input_tx.clone();
        let response_tx_task = response_tx.clone();
        let input_uuid = input_char.uuid;
        tokio::spawn(async move {
            while let Some(data) = stream.next().await {
                if !notify_uuids.contains(&data.uuid) {
                    continue;
                }
                if data.uuid == input_uuid {
                    let _ = input_tx_task.send(data.value);
                } else {
                    let _ = response_tx_task.send(data.value);
                }
            }
        });

        Ok(Self {
            peripheral,
            command_char,
            vibration_char,
            input_rx,
            response_rx,
        })
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn write(&self, channel: Channel, payload: &[u8]) -> Result<(), TransportError> {
        let characteristic = match channel {
            Channel::Command => &self.command_char,
            Channel::Vibration => &self.vibration_char,
        };
        self.peripheral
            .write(characteristic, payload, WriteType::WithoutResponse)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    fn input_reports(&self) -> Receiver<Vec<u8>> {
        self.input_rx.clone()
    }

    fn command_responses(&self) -> Receiver<Vec<u8>> {
        self.response_rx.clone()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}
