//! The opaque virtual-gamepad sink boundary named in the purpose statement:
//! "OS-level virtual-gamepad driver, treated as an opaque sink that accepts
//! report structs and raises rumble callbacks." Mirrors the teacher's
//! `KeyboardBackend`/`MouseBackend` trait-plus-mock pattern.

use crate::error::SinkError;
use bitflags::bitflags;
use std::sync::{Arc, Mutex};

bitflags! {
    /// X360 target-button vocabulary (base spec §6): digital buttons only,
    /// triggers and sticks are separate analog fields on [`X360Report`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct X360Buttons: u16 {
        const UP     = 0x0001;
        const DOWN   = 0x0002;
        const LEFT   = 0x0004;
        const RIGHT  = 0x0008;
        const START  = 0x0010;
        const BACK   = 0x0020;
        const L_STK  = 0x0040;
        const R_STK  = 0x0080;
        const LB     = 0x0100;
        const RB     = 0x0200;
        const GUIDE  = 0x0400;
        const A      = 0x1000;
        const B      = 0x2000;
        const X      = 0x4000;
        const Y      = 0x8000;
    }
}

bitflags! {
    /// DS4 digital-button vocabulary (base spec §6), excluding the D-pad
    /// (carried in the low nibble via [`Ds4Report::set_dpad`]) and GUIDE /
    /// TOUCHPAD, which real DS4 HID reports carry in a separate status byte
    /// (see [`Ds4Report::special`], matching the PS/touchpad-click bits of
    /// the real wire format rather than stealing a `buttons` bit for them).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Ds4Buttons: u16 {
        const SQUARE          = 1 << 4;
        const CROSS           = 1 << 5;
        const CIRCLE          = 1 << 6;
        const TRIANGLE        = 1 << 7;
        const SHOULDER_LEFT   = 1 << 8;
        const SHOULDER_RIGHT  = 1 << 9;
        const TRIGGER_LEFT    = 1 << 10;
        const TRIGGER_RIGHT   = 1 << 11;
        const SHARE           = 1 << 12;
        const OPTIONS         = 1 << 13;
        const THUMB_LEFT      = 1 << 14;
        const THUMB_RIGHT     = 1 << 15;
    }
}

/// Bits of [`Ds4Report::special`], matching the real DS4 HID status byte.
pub const DS4_SPECIAL_GUIDE: u8 = 1 << 0;
pub const DS4_SPECIAL_TOUCHPAD: u8 = 1 << 1;

/// D-pad hat encoding shared by both report kinds: 0..7 for the eight
/// octants (starting North, clockwise), 8 for centered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpadDirection {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
    Centered = 8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct X360Report {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

impl Default for X360Report {
    fn default() -> Self {
        Self { buttons: 0, left_trigger: 0, right_trigger: 0, thumb_lx: 0, thumb_ly: 0, thumb_rx: 0, thumb_ry: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ds4Report {
    pub thumb_lx: u8,
    pub thumb_ly: u8,
    pub thumb_rx: u8,
    pub thumb_ry: u8,
    pub buttons: u16,
    pub special: u8,
    pub trigger_l: u8,
    pub trigger_r: u8,
    pub accel: (i16, i16, i16),
    pub gyro: (i16, i16, i16),
}

impl Default for Ds4Report {
    fn default() -> Self {
        let mut r = Self {
            thumb_lx: 128,
            thumb_ly: 128,
            thumb_rx: 128,
            thumb_ry: 128,
            buttons: 0,
            special: 0,
            trigger_l: 0,
            trigger_r: 0,
            accel: (0, 0, 0),
            gyro: (0, 0, 0),
        };
        r.set_dpad(DpadDirection::Centered);
        r
    }
}

impl Ds4Report {
    pub fn set_dpad(&mut self, dpad: DpadDirection) {
        const DPAD_MASK: u16 = 0x000F;
        self.buttons = (self.buttons & !DPAD_MASK) | (dpad as u16);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GamepadReport {
    X360(X360Report),
    Ds4(Ds4Report),
}

/// Resolve a target-button name from the X360 vocabulary (base spec §6).
pub fn x360_button_from_name(name: &str) -> Option<X360Buttons> {
    Some(match name {
        "UP" => X360Buttons::UP,
        "DOWN" => X360Buttons::DOWN,
        "LEFT" => X360Buttons::LEFT,
        "RIGHT" => X360Buttons::RIGHT,
        "START" => X360Buttons::START,
        "BACK" => X360Buttons::BACK,
        "L_STK" => X360Buttons::L_STK,
        "R_STK" => X360Buttons::R_STK,
        "LB" => X360Buttons::LB,
        "RB" => X360Buttons::RB,
        "GUIDE" => X360Buttons::GUIDE,
        "A" => X360Buttons::A,
        "B" => X360Buttons::B,
        "X" => X360Buttons::X,
        "Y" => X360Buttons::Y,
        _ => return None,
    })
}

/// Where a DS4 target-button name (base spec §6) lands on the wire: most are
/// bits of [`Ds4Buttons`], but GUIDE and TOUCHPAD live in the separate
/// `special` status byte on real DS4 HID reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ds4Target {
    Button(Ds4Buttons),
    Special(u8),
}

/// Resolve a target-button name from the DS4 vocabulary (base spec §6),
/// excluding the D-pad directions which are not digital buttons.
pub fn ds4_button_from_name(name: &str) -> Option<Ds4Target> {
    Some(match name {
        "START" => Ds4Target::Button(Ds4Buttons::OPTIONS),
        "TOUCHPAD" => Ds4Target::Special(DS4_SPECIAL_TOUCHPAD),
        "L_STK" => Ds4Target::Button(Ds4Buttons::THUMB_LEFT),
        "R_STK" => Ds4Target::Button(Ds4Buttons::THUMB_RIGHT),
        "SHARE" => Ds4Target::Button(Ds4Buttons::SHARE),
        "LB" => Ds4Target::Button(Ds4Buttons::SHOULDER_LEFT),
        "RB" => Ds4Target::Button(Ds4Buttons::SHOULDER_RIGHT),
        "GUIDE" => Ds4Target::Special(DS4_SPECIAL_GUIDE),
        "A" => Ds4Target::Button(Ds4Buttons::CROSS),
        "B" => Ds4Target::Button(Ds4Buttons::CIRCLE),
        "X" => Ds4Target::Button(Ds4Buttons::SQUARE),
        "Y" => Ds4Target::Button(Ds4Buttons::TRIANGLE),
        _ => return None,
    })
}

pub type RumbleCallback = Arc<dyn Fn(u8, u8) + Send + Sync>;

/// The opaque non-goal boundary: accepts assembled reports, raises rumble
/// callbacks. A real implementation talks to ViGEm/vJoy; this crate only
/// defines the trait and a recording mock for tests.
pub trait VirtualGamepadSink: Send + Sync {
    fn update(&self, report: GamepadReport) -> Result<(), SinkError>;
    fn register_rumble_callback(&self, callback: RumbleCallback);
}

/// Test double that records every pushed report and lets tests fire
/// synthetic rumble callbacks, mirroring `MockKeyboardBackend`.
#[derive(Default)]
pub struct MockGamepadSink {
    pub reports: Mutex<Vec<GamepadReport>>,
    callback: Mutex<Option<RumbleCallback>>,
}

impl MockGamepadSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the host OS requesting force feedback.
    pub fn fire_rumble(&self, large_motor: u8, small_motor: u8) {
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb(large_motor, small_motor);
        }
    }

    pub fn last_report(&self) -> Option<GamepadReport> {
        self.reports.lock().unwrap().last().copied()
    }
}

impl VirtualGamepadSink for MockGamepadSink {
    fn update(&self, report: GamepadReport) -> Result<(), SinkError> {
        self.reports.lock().unwrap().push(report);
        Ok(())
    }

    fn register_rumble_callback(&self, callback: RumbleCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    #[test]
    fn set_dpad_preserves_other_buttons() {
        let mut report = Ds4Report { buttons: Ds4Buttons::SQUARE.bits(), ..Ds4Report::default() };
        report.set_dpad(DpadDirection::East);
        assert_ne!(report.buttons & Ds4Buttons::SQUARE.bits(), 0);
        assert_eq!(report.buttons & 0x000F, DpadDirection::East as u16);
    }

    #[test]
    fn mock_sink_records_reports_and_fires_rumble() {
        let sink = MockGamepadSink::new();
        let seen = Arc::new(AtomicU8::new(0));
        let seen_clone = seen.clone();
        sink.register_rumble_callback(Arc::new(move |large, _small| {
            seen_clone.store(large, Ordering::SeqCst);
        }));
        sink.update(GamepadReport::X360(X360Report::default())).unwrap();
        assert!(sink.last_report().is_some());
        sink.fire_rumble(200, 10);
        assert_eq!(seen.load(Ordering::SeqCst), 200);
    }
}
