//! Parses the 60-byte input report into a typed [`InputSnapshot`] and applies
//! stick calibration when available.

use crate::buttons::{decode_switch_buttons, ButtonEncoding, SwitchButtons};
use crate::calibration::StickCalibration;
use crate::codec::{decode_s, decode_u, unpack_stick};
use crate::error::DecodeError;

pub const INPUT_REPORT_LEN: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// One decoded input report. Stick fields are calibrated floats when a
/// calibration is supplied at decode time, otherwise they fall back to the
/// centered-at-2048 raw range expressed as floats in [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputSnapshot {
    pub time: u32,
    pub buttons: SwitchButtons,
    pub left_stick: (f32, f32),
    pub right_stick: (f32, f32),
    pub mouse_x: u16,
    pub mouse_y: u16,
    pub mouse_roughness: u16,
    pub mouse_distance: u16,
    pub magnetometer: Vector3,
    pub battery_voltage_v: f32,
    pub battery_current_ma: f32,
    pub temperature_c: f32,
    pub accelerometer: Vector3,
    pub gyroscope: Vector3,
}

/// Raw, uncalibrated stick samples, exposed so mouse synthesis (which needs
/// the pre-rotation stick value) and the decoder can share one pass over the
/// frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawSticks {
    pub left: (u16, u16),
    pub right: (u16, u16),
}

/// Decode a 60-byte input report. `left_cal`/`right_cal` are applied when
/// present; a side with no calibration (e.g. a lone right Joy-Con has no
/// left-stick calibration) is decoded as a raw-centered float.
pub fn decode_input_report(
    data: &[u8],
    encoding: ButtonEncoding,
    left_cal: Option<StickCalibration>,
    right_cal: Option<StickCalibration>,
    deadzone: i32,
) -> Result<(InputSnapshot, RawSticks), DecodeError> {
    if data.len() < INPUT_REPORT_LEN {
        return Err(DecodeError::FrameTooShort {
            got: data.len(),
            need: INPUT_REPORT_LEN,
        });
    }

    let time = decode_u(&data[0..4]) as u32;
    let buttons_raw = decode_u(&data[4..8]) as u32;
    let buttons = decode_switch_buttons(buttons_raw, encoding);

    let left_raw = unpack_stick(&[data[10], data[11], data[12]]);
    let right_raw = unpack_stick(&[data[13], data[14], data[15]]);

    let left_stick = match left_cal {
        Some(cal) => cal.apply(left_raw.0, left_raw.1, deadzone),
        None => (raw_centered(left_raw.0), raw_centered(left_raw.1)),
    };
    let right_stick = match right_cal {
        Some(cal) => cal.apply(right_raw.0, right_raw.1, deadzone),
        None => (raw_centered(right_raw.0), raw_centered(right_raw.1)),
    };

    let mouse_x = decode_u(&data[16..18]) as u16;
    let mouse_y = decode_u(&data[18..20]) as u16;
    let mouse_roughness = decode_u(&data[20..22]) as u16;
    let mouse_distance = decode_u(&data[22..24]) as u16;

    let magnetometer = Vector3 {
        x: decode_s(&data[25..27]) as i16,
        y: decode_s(&data[27..29]) as i16,
        z: decode_s(&data[29..31]) as i16,
    };

    let battery_voltage_v = decode_u(&data[31..33]) as f32 / 1000.0;
    let battery_current_ma = decode_u(&data[33..35]) as f32 / 100.0;
    let temperature_c = 25.0 + decode_u(&data[46..48]) as f32 / 127.0;

    let accelerometer = Vector3 {
        x: decode_s(&data[48..50]) as i16,
        y: decode_s(&data[50..52]) as i16,
        z: decode_s(&data[52..54]) as i16,
    };
    let gyroscope = Vector3 {
        x: decode_s(&data[54..56]) as i16,
        y: decode_s(&data[56..58]) as i16,
        z: decode_s(&data[58..60]) as i16,
    };

    Ok((
        InputSnapshot {
            time,
            buttons,
            left_stick,
            right_stick,
            mouse_x,
            mouse_y,
            mouse_roughness,
            mouse_distance,
            magnetometer,
            battery_voltage_v,
            battery_current_ma,
            temperature_c,
            accelerometer,
            gyroscope,
        },
        RawSticks { left: left_raw, right: right_raw },
    ))
}

fn raw_centered(raw: u16) -> f32 {
    ((raw as f32) - 2048.0) / 2048.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crafted_frame() -> Vec<u8> {
        let mut data = vec![0u8; INPUT_REPORT_LEN];
        data[0..4].copy_from_slice(&0x0102_0304u32.to_le_bytes());
        data[4..8].copy_from_slice(&SwitchButtons::A.bits().to_le_bytes());
        // left stick centered at 0x800, right stick centered at 0x800
        let packed_left: u32 = 0x800 | (0x800 << 12);
        data[10] = (packed_left & 0xFF) as u8;
        data[11] = ((packed_left >> 8) & 0xFF) as u8;
        data[12] = ((packed_left >> 16) & 0xFF) as u8;
        let packed_right: u32 = 0x800 | (0x800 << 12);
        data[13] = (packed_right & 0xFF) as u8;
        data[14] = ((packed_right >> 8) & 0xFF) as u8;
        data[15] = ((packed_right >> 16) & 0xFF) as u8;
        data
    }

    #[test]
    fn rejects_short_frames() {
        let data = vec![0u8; 10];
        let err = decode_input_report(&data, ButtonEncoding::Ble, None, None, 100).unwrap_err();
        matches!(err, DecodeError::FrameTooShort { .. });
    }

    #[test]
    fn decodes_reference_frame() {
        let data = crafted_frame();
        let (snapshot, _) = decode_input_report(&data, ButtonEncoding::Ble, None, None, 100).unwrap();
        assert_eq!(snapshot.time, 0x0102_0304);
        assert_eq!(snapshot.buttons, SwitchButtons::A);
        assert!(snapshot.left_stick.0.abs() < 0.01);
        assert!(snapshot.left_stick.1.abs() < 0.01);
        assert_eq!(snapshot.battery_voltage_v, 0.0);
    }
}
