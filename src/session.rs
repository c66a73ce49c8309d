//! Device session: connect, identify, calibrate, enable features, and expose
//! the typed command API. Grounded in `examples/original_source/controller.py`
//! (`Controller` class) and the teacher's `joycon2::connection` state machine.

use crate::buttons::ButtonEncoding;
use crate::calibration::{AxisCalibration, StickCalibration};
use crate::codec::{decode_u, unpack_stick};
use crate::command::CommandChannel;
use crate::error::{CommandError, SessionError};
use crate::input::{decode_input_report, InputSnapshot, RawSticks};
use crate::protocol::*;
use crate::transport::{Channel, Transport};
use crate::vibration::VibrationFrame;
use crossbeam_channel::Receiver;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    JoyconLeft,
    JoyconRight,
    ProController2,
    NsoGameCube,
}

impl DeviceKind {
    pub fn from_product_id(product_id: u16) -> Option<Self> {
        match product_id {
            PRODUCT_ID_JOYCON_LEFT => Some(Self::JoyconLeft),
            PRODUCT_ID_JOYCON_RIGHT => Some(Self::JoyconRight),
            PRODUCT_ID_PRO_CONTROLLER2 => Some(Self::ProController2),
            PRODUCT_ID_NSO_GAMECUBE => Some(Self::NsoGameCube),
            _ => None,
        }
    }

    pub fn is_joycon_left(&self) -> bool {
        matches!(self, Self::JoyconLeft)
    }

    pub fn is_joycon_right(&self) -> bool {
        matches!(self, Self::JoyconRight)
    }

    pub fn is_joycon(&self) -> bool {
        self.is_joycon_left() || self.is_joycon_right()
    }

    pub fn has_second_stick(&self) -> bool {
        matches!(self, Self::ProController2 | Self::NsoGameCube)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Ready,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub serial_number: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub color_body: [u8; 3],
    pub color_buttons: [u8; 3],
    pub color_grip_l: [u8; 3],
    pub color_grip_r: [u8; 3],
}

pub struct DeviceSession {
    id: u64,
    transport: Arc<dyn Transport>,
    command: CommandChannel,
    kind: DeviceKind,
    encoding: ButtonEncoding,
    state: Mutex<ConnectionState>,
    identity: Mutex<Option<DeviceIdentity>>,
    left_calibration: Mutex<Option<StickCalibration>>,
    right_calibration: Mutex<Option<StickCalibration>>,
    vibration_seq: AtomicU8,
    deadzone: i32,
}

impl DeviceSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        kind: DeviceKind,
        encoding: ButtonEncoding,
        deadzone: i32,
    ) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            transport: transport.clone(),
            command: CommandChannel::new(transport),
            kind,
            encoding,
            state: Mutex::new(ConnectionState::New),
            identity: Mutex::new(None),
            left_calibration: Mutex::new(None),
            right_calibration: Mutex::new(None),
            vibration_seq: AtomicU8::new(0),
            deadzone,
        }
    }

    /// Stable identity for this session, used to key per-device state (mouse
    /// synthesis) that must survive across snapshots without a back-pointer.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn is_joycon_left(&self) -> bool {
        self.kind.is_joycon_left()
    }

    pub fn is_joycon_right(&self) -> bool {
        self.kind.is_joycon_right()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("session state mutex poisoned")
    }

    /// Reads identity, reads calibration, leaves notification subscription to
    /// the transport layer (already subscribed when the transport was
    /// constructed). BLE-specific throughput tuning is a transport concern,
    /// not modeled here.
    pub async fn connect(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != ConnectionState::New {
                return Err(SessionError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        if self.encoding == ButtonEncoding::Usb {
            self.usb_init().await?;
        }

        let identity = self.read_controller_info().await?;
        info!("connected to {:?} serial={}", self.kind, identity.serial_number);
        *self.identity.lock().unwrap() = Some(identity);

        self.read_calibration().await?;

        *self.state.lock().unwrap() = ConnectionState::Ready;
        Ok(())
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.identity.lock().unwrap().clone()
    }

    /// USB has no BLE pairing concept; a wired Pro Controller 2 instead gets
    /// this fixed two-command sequence once at connect time.
    async fn usb_init(&self) -> Result<(), CommandError> {
        self.command.send(COMMAND_USB, SUBCOMMAND_USB_INIT, USB_INIT_PAYLOAD).await?;
        tokio::time::sleep(crate::transport::usb::USB_COMMAND_DELAY).await;
        self.command.send(COMMAND_USB, SUBCOMMAND_USB_REPORT_TYPE, USB_REPORT_TYPE_PAYLOAD).await?;
        Ok(())
    }

    async fn read_controller_info(&self) -> Result<DeviceIdentity, SessionError> {
        let data = self
            .read_memory(LENGTH_CONTROLLER_INFO, ADDRESS_CONTROLLER_INFO)
            .await?;
        Ok(DeviceIdentity {
            serial_number: String::from_utf8_lossy(&data[2..16]).trim_end_matches('\0').to_string(),
            vendor_id: decode_u(&data[18..20]) as u16,
            product_id: decode_u(&data[20..22]) as u16,
            color_body: [data[25], data[26], data[27]],
            color_buttons: [data[28], data[29], data[30]],
            color_grip_l: [data[31], data[32], data[33]],
            color_grip_r: [data[34], data[35], data[36]],
        })
    }

    async fn read_calibration(&self) -> Result<(), SessionError> {
        let (addr1, addr2) = (ADDRESS_CALIBRATION_USER_1, ADDRESS_CALIBRATION_USER_2);
        let user1 = self.read_memory(LENGTH_CALIBRATION, addr1).await?;
        let user2 = self.read_memory(LENGTH_CALIBRATION, addr2).await?;

        let cal1 = if decode_u(&user1[0..3]) as u32 == CALIBRATION_USER_UNWRITTEN {
            self.read_memory(LENGTH_CALIBRATION, ADDRESS_CALIBRATION_FACTORY_1).await?
        } else {
            user1
        };
        let cal2 = if decode_u(&user2[0..3]) as u32 == CALIBRATION_USER_UNWRITTEN {
            self.read_memory(LENGTH_CALIBRATION, ADDRESS_CALIBRATION_FACTORY_2).await?
        } else {
            user2
        };

        let stick1 = parse_stick_calibration(&cal1);
        let stick2 = parse_stick_calibration(&cal2);

        match self.kind {
            DeviceKind::JoyconLeft => *self.left_calibration.lock().unwrap() = Some(stick1),
            DeviceKind::JoyconRight => *self.right_calibration.lock().unwrap() = Some(stick1),
            DeviceKind::ProController2 | DeviceKind::NsoGameCube => {
                *self.left_calibration.lock().unwrap() = Some(stick1);
                *self.right_calibration.lock().unwrap() = Some(stick2);
            }
        }
        Ok(())
    }

    pub async fn set_leds(&self, player_number: u8, reversed: bool) -> Result<(), CommandError> {
        let mut value = led_pattern(player_number);
        if reversed {
            value = crate::codec::reverse_bits(value, 4);
        }
        let payload = [value, 0x00, 0x00, 0x00];
        self.command.send(COMMAND_LEDS, SUBCOMMAND_LEDS_SET_PLAYER, &payload).await?;
        Ok(())
    }

    pub async fn play_preset(&self, preset_id: u8) -> Result<(), CommandError> {
        self.command.send(COMMAND_VIBRATION_PRESET, SUBCOMMAND_VIBRATION_PLAY, &[preset_id]).await?;
        Ok(())
    }

    pub async fn read_memory(&self, length: u8, address: u32) -> Result<Vec<u8>, SessionError> {
        if length > 0x4F {
            return Err(CommandError::InvalidArgument(format!(
                "memory reads are capped at 0x4F bytes, got {length:#x}"
            ))
            .into());
        }
        let mut payload = vec![length, 0x7E, 0x00, 0x00];
        payload.extend_from_slice(&address.to_le_bytes());
        let response = self.command.send(COMMAND_MEMORY, SUBCOMMAND_MEMORY_READ, &payload).await?;

        if response.len() < 8 + length as usize {
            return Err(CommandError::UnexpectedResponse("memory read short".into()).into());
        }
        let echoed_length = response[8];
        let echoed_address = decode_u(&response[12..16]) as u32;
        if echoed_length != length || echoed_address != address {
            return Err(CommandError::UnexpectedResponse(format!(
                "memory read echo mismatch: len {echoed_length} addr {echoed_address:#x}"
            ))
            .into());
        }
        Ok(response[16..16 + length as usize].to_vec())
    }

    pub async fn enable_features(&self, mask: u32) -> Result<(), CommandError> {
        let payload = mask.to_le_bytes();
        self.command.send(COMMAND_FEATURE, SUBCOMMAND_FEATURE_INIT, &payload).await?;
        self.command.send(COMMAND_FEATURE, SUBCOMMAND_FEATURE_ENABLE, &payload).await?;
        Ok(())
    }

    /// Preserves the original protocol's duplicate-local-MAC payload
    /// verbatim (see design note on Open Question (c)).
    pub async fn pair(&self, local_mac_le: [u8; 6]) -> Result<(), CommandError> {
        let mut set_mac_payload = vec![0x00, 0x02];
        set_mac_payload.extend_from_slice(&local_mac_le);
        set_mac_payload.extend_from_slice(&local_mac_le);
        self.command.send(COMMAND_PAIR, SUBCOMMAND_PAIR_SET_MAC, &set_mac_payload).await?;
        self.command.send(COMMAND_PAIR, SUBCOMMAND_PAIR_LTK1, &LTK1).await?;
        self.command.send(COMMAND_PAIR, SUBCOMMAND_PAIR_LTK2, &LTK2).await?;
        self.command.send(COMMAND_PAIR, SUBCOMMAND_PAIR_FINISH, &[0x00]).await?;
        Ok(())
    }

    pub async fn set_vibration(&self, frame: VibrationFrame) -> Result<(), crate::error::TransportError> {
        let seq = self.vibration_seq.fetch_add(1, Ordering::SeqCst) & 0x0F;
        let prefix = match self.encoding {
            ButtonEncoding::Ble => BLE_VIBRATION_PREFIX,
            ButtonEncoding::Usb => USB_VIBRATION_PREFIX,
        };
        let mut payload = vec![prefix, 0x50 | seq];
        payload.extend_from_slice(&frame.pack());
        payload.resize(17, 0);
        self.transport.write(Channel::Vibration, &payload).await
    }

    pub fn input_reports(&self) -> Receiver<Vec<u8>> {
        self.transport.input_reports()
    }

    /// Decode a raw notification using this session's active button
    /// encoding, calibration, and deadzone.
    pub fn decode(&self, data: &[u8]) -> Result<(InputSnapshot, RawSticks), crate::error::DecodeError> {
        debug!("decoding input frame of {} bytes for {:?}", data.len(), self.kind);
        decode_input_report(
            data,
            self.encoding,
            *self.left_calibration.lock().unwrap(),
            *self.right_calibration.lock().unwrap(),
            self.deadzone,
        )
    }

    pub async fn disconnect(&self) -> Result<(), crate::error::TransportError> {
        let mut state = self.state.lock().unwrap();
        if *state == ConnectionState::Closed {
            return Ok(());
        }
        *state = ConnectionState::Closed;
        drop(state);
        self.transport.disconnect().await
    }
}

fn parse_stick_calibration(data: &[u8]) -> StickCalibration {
    // `StickCalibrationData` layout from the original source: three packed
    // 12-bit triples for center, max extent, min extent.
    let (center_x, center_y) = unpack_stick(&[data[0], data[1], data[2]]);
    let (max_x, max_y) = unpack_stick(&[data[3], data[4], data[5]]);
    let (min_x, min_y) = unpack_stick(&[data[6], data[7], data[8]]);
    StickCalibration {
        x: AxisCalibration { center: center_x, max_extent: max_x, min_extent: min_x },
        y: AxisCalibration { center: center_y, max_extent: max_y, min_extent: min_y },
    }
}
