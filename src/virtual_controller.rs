//! Virtual-controller aggregator: combines 1-2 physical device sessions into
//! one logical pad, merging button state across asynchronous update streams,
//! remapping buttons through the configured tables, rotating axes when a
//! lone Joy-Con is held sideways, and routing rumble callbacks back to the
//! attached sessions. Grounded in
//! `examples/original_source/virtual_controller.py`'s `VirtualController`.

use crate::buttons::{switch_button_from_name, SwitchButtons};
use crate::config::{ButtonMap, ButtonTarget, Config, GamepadMode};
use crate::error::VirtualControllerError;
use crate::gamepad::{
    ds4_button_from_name, x360_button_from_name, Ds4Report, Ds4Target, DpadDirection, GamepadReport,
    VirtualGamepadSink, X360Report,
};
use crate::input::InputSnapshot;
use crate::mouse_sink::MouseSink;
use crate::mouse_synth::MouseSynthesizer;
use crate::rumble::RumblePump;
use crate::session::{DeviceKind, DeviceSession};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

/// One [`ButtonMap`] resolved to Switch-button bits once, instead of parsing
/// names on every input frame.
struct ResolvedMap(Vec<(SwitchButtons, ButtonTarget)>);

impl ResolvedMap {
    fn build(map: &ButtonMap) -> Self {
        let mut resolved = Vec::new();
        for (name, target) in map {
            let Some(target) = target else { continue };
            let Some(bit) = switch_button_from_name(name) else { continue };
            resolved.push((bit, target.clone()));
        }
        Self(resolved)
    }
}

struct ResolvedButtonMaps {
    dual_joycons: ResolvedMap,
    single_joycon_l: ResolvedMap,
    single_joycon_r: ResolvedMap,
    procon: ResolvedMap,
}

impl ResolvedButtonMaps {
    fn build(config: &Config) -> Self {
        Self {
            dual_joycons: ResolvedMap::build(&config.buttons.dual_joycons),
            single_joycon_l: ResolvedMap::build(&config.buttons.single_joycon_l),
            single_joycon_r: ResolvedMap::build(&config.buttons.single_joycon_r),
            procon: ResolvedMap::build(&config.buttons.procon),
        }
    }
}

/// Which side of a dual-Joy-Con pair (or "only one attached") produced a
/// snapshot, selecting which map in [`ResolvedButtonMaps`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MixSource {
    DualJoycons,
    SingleLeft,
    SingleRight,
    Procon,
}

#[derive(Default, Debug, Clone, Copy)]
struct MappedButtons {
    left_trigger: bool,
    right_trigger: bool,
    dpad_up: bool,
    dpad_down: bool,
    dpad_left: bool,
    dpad_right: bool,
}

fn dpad_from_pressed(up: bool, down: bool, left: bool, right: bool) -> DpadDirection {
    match (up, down, left, right) {
        (true, false, false, false) => DpadDirection::North,
        (true, false, false, true) => DpadDirection::NorthEast,
        (false, false, false, true) => DpadDirection::East,
        (false, true, false, true) => DpadDirection::SouthEast,
        (false, true, false, false) => DpadDirection::South,
        (false, true, true, false) => DpadDirection::SouthWest,
        (false, false, true, false) => DpadDirection::West,
        (true, false, true, false) => DpadDirection::NorthWest,
        _ => DpadDirection::Centered,
    }
}

fn apply_map_x360(buttons: SwitchButtons, map: &ResolvedMap) -> (X360Report, MappedButtons) {
    let mut report = X360Report::default();
    let mut mapped = MappedButtons::default();
    for (bit, target) in &map.0 {
        if !buttons.contains(*bit) {
            continue;
        }
        match target {
            ButtonTarget::Button(name) => {
                if let Some(b) = x360_button_from_name(name) {
                    report.buttons |= b.bits();
                }
            }
            ButtonTarget::LeftTrigger => mapped.left_trigger = true,
            ButtonTarget::RightTrigger => mapped.right_trigger = true,
            ButtonTarget::DpadUp => mapped.dpad_up = true,
            ButtonTarget::DpadDown => mapped.dpad_down = true,
            ButtonTarget::DpadLeft => mapped.dpad_left = true,
            ButtonTarget::DpadRight => mapped.dpad_right = true,
        }
    }
    if mapped.dpad_up {
        report.buttons |= crate::gamepad::X360Buttons::UP.bits();
    }
    if mapped.dpad_down {
        report.buttons |= crate::gamepad::X360Buttons::DOWN.bits();
    }
    if mapped.dpad_left {
        report.buttons |= crate::gamepad::X360Buttons::LEFT.bits();
    }
    if mapped.dpad_right {
        report.buttons |= crate::gamepad::X360Buttons::RIGHT.bits();
    }
    report.left_trigger = if mapped.left_trigger { 255 } else { 0 };
    report.right_trigger = if mapped.right_trigger { 255 } else { 0 };
    (report, mapped)
}

fn apply_map_ds4(buttons: SwitchButtons, map: &ResolvedMap) -> Ds4Report {
    let mut report = Ds4Report::default();
    let mut mapped = MappedButtons::default();
    for (bit, target) in &map.0 {
        if !buttons.contains(*bit) {
            continue;
        }
        match target {
            ButtonTarget::Button(name) => match ds4_button_from_name(name) {
                Some(Ds4Target::Button(b)) => report.buttons |= b.bits(),
                Some(Ds4Target::Special(s)) => report.special |= s,
                None => {}
            },
            ButtonTarget::LeftTrigger => mapped.left_trigger = true,
            ButtonTarget::RightTrigger => mapped.right_trigger = true,
            ButtonTarget::DpadUp => mapped.dpad_up = true,
            ButtonTarget::DpadDown => mapped.dpad_down = true,
            ButtonTarget::DpadLeft => mapped.dpad_left = true,
            ButtonTarget::DpadRight => mapped.dpad_right = true,
        }
    }
    report.set_dpad(dpad_from_pressed(mapped.dpad_up, mapped.dpad_down, mapped.dpad_left, mapped.dpad_right));
    report.trigger_l = if mapped.left_trigger { 255 } else { 0 };
    report.trigger_r = if mapped.right_trigger { 255 } else { 0 };
    report
}

fn stick_to_u8(v: f32) -> u8 {
    (((v.clamp(-1.0, 1.0) + 1.0) * 127.5) as u8).min(255)
}

fn stick_to_i16(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Rotate a lone Joy-Con's own stick into the virtual pad's left-stick slot
/// per base spec §4.7 step 3.
fn sideways_left_stick(kind: DeviceKind, left: (f32, f32), right: (f32, f32)) -> (f32, f32) {
    match kind {
        DeviceKind::JoyconRight => (right.1, -right.0),
        DeviceKind::JoyconLeft => (-left.1, left.0),
        _ => left,
    }
}

struct AttachedDevice {
    session: Arc<DeviceSession>,
}

/// Aggregates 1-2 physical sessions into one virtual pad and pushes merged
/// reports to a [`VirtualGamepadSink`]. Holds its own [`RumblePump`], wired
/// to the sink's rumble callback by [`VirtualController::init_added_controller`].
pub struct VirtualController<S: VirtualGamepadSink + 'static> {
    player_number: Mutex<u8>,
    devices: Mutex<Vec<AttachedDevice>>,
    /// (left, right) last-seen masks behind a single lock: the two device
    /// threads of a combined slot call `handle_snapshot` concurrently, and a
    /// pair of separately-locked mutexes taken in opposite orders on the two
    /// branches below would deadlock.
    last_buttons: Mutex<(SwitchButtons, SwitchButtons)>,
    sink: Arc<S>,
    rumble: Mutex<RumblePump>,
    maps: Arc<ResolvedButtonMaps>,
    mode: GamepadMode,
    motion_controls: bool,
    mouse: Option<Arc<MouseSynthesizer>>,
    mouse_sink: Option<Arc<dyn MouseSink>>,
}

impl<S: VirtualGamepadSink + 'static> VirtualController<S> {
    pub fn new(player_number: u8, config: &Config, sink: Arc<S>, runtime: Handle) -> Self {
        let mouse = if config.mouse.enabled {
            Some(Arc::new(MouseSynthesizer::new(config.mouse.clone())))
        } else {
            None
        };
        Self {
            player_number: Mutex::new(player_number),
            devices: Mutex::new(Vec::new()),
            last_buttons: Mutex::new((SwitchButtons::empty(), SwitchButtons::empty())),
            sink,
            rumble: Mutex::new(RumblePump::new(Vec::new(), runtime)),
            maps: Arc::new(ResolvedButtonMaps::build(config)),
            mode: config.mode,
            motion_controls: config.motion_controls,
            mouse,
            mouse_sink: None,
        }
    }

    /// Attach a mouse sink; without one, mouse synthesis computes deltas but
    /// drops them (the sink is an opaque non-goal collaborator that may be
    /// absent, e.g. in tests or headless builds).
    pub fn set_mouse_sink(&mut self, sink: Arc<dyn MouseSink>) {
        self.mouse_sink = Some(sink);
    }

    pub fn player_number(&self) -> u8 {
        *self.player_number.lock().unwrap()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().unwrap().len()
    }

    pub fn holds_left(&self) -> bool {
        self.devices.lock().unwrap().iter().any(|d| d.session.is_joycon_left())
    }

    pub fn holds_right(&self) -> bool {
        self.devices.lock().unwrap().iter().any(|d| d.session.is_joycon_right())
    }

    /// Add a physical device to this slot. At most two; a second device must
    /// be the opposite Joy-Con side of the first.
    pub fn add_controller(&self, session: Arc<DeviceSession>) -> Result<(), VirtualControllerError> {
        let mut devices = self.devices.lock().unwrap();
        if devices.len() >= 2 {
            return Err(VirtualControllerError::CapacityExceeded);
        }
        if let Some(existing) = devices.first() {
            let compatible = (existing.session.is_joycon_left() && session.is_joycon_right())
                || (existing.session.is_joycon_right() && session.is_joycon_left());
            if !compatible {
                return Err(VirtualControllerError::IncompatibleCombination);
            }
        }
        devices.push(AttachedDevice { session });
        let sessions: Vec<_> = devices.iter().map(|d| d.session.clone()).collect();
        self.rumble.lock().unwrap().set_sessions(sessions);
        Ok(())
    }

    /// Set player LEDs (mirrored when this is a lone right Joy-Con, per base
    /// spec §4.7) and register the input callback. Runs outside any
    /// slot-allocation lock, per the concurrency model in base spec §5.
    pub async fn init_added_controller(&self, session: &Arc<DeviceSession>) {
        let player = self.player_number();
        let devices_len = self.devices.lock().unwrap().len();
        let reversed = devices_len == 1 && session.is_joycon_right();
        if let Err(e) = session.set_leds(player, reversed).await {
            log::warn!("failed to set player LEDs: {e}");
        }
    }

    /// Idempotent removal. Returns `(removed, now_empty)`: `removed` tells
    /// the caller whether `session_id` was actually attached here (a
    /// supervisor iterating several slots must not stop at the first one
    /// that merely didn't contain the session).
    pub fn remove_controller(&self, session_id: u64) -> (bool, bool) {
        let mut devices = self.devices.lock().unwrap();
        let before = devices.len();
        devices.retain(|d| d.session.id() != session_id);
        let removed = devices.len() != before;
        let sessions: Vec<_> = devices.iter().map(|d| d.session.clone()).collect();
        self.rumble.lock().unwrap().set_sessions(sessions);
        (removed, devices.is_empty())
    }

    /// Called (synchronously, from the single event loop) whenever a
    /// decoded snapshot arrives from one of this pad's attached sessions.
    pub fn handle_snapshot(&self, session: &Arc<DeviceSession>, mut snapshot: InputSnapshot) {
        if let (Some(mouse), Some(sink)) = (&self.mouse, &self.mouse_sink) {
            mouse.process(session.id(), session.kind(), &mut snapshot, sink.as_ref());
        }

        let devices_len = self.devices.lock().unwrap().len();
        let (source, mixed_buttons) = if devices_len == 2 {
            let mut last = self.last_buttons.lock().unwrap();
            let mixed = if session.is_joycon_left() {
                last.0 = snapshot.buttons;
                last.0 | last.1
            } else {
                last.1 = snapshot.buttons;
                last.0 | last.1
            };
            (MixSource::DualJoycons, mixed)
        } else {
            let source = match session.kind() {
                DeviceKind::JoyconLeft => MixSource::SingleLeft,
                DeviceKind::JoyconRight => MixSource::SingleRight,
                DeviceKind::ProController2 | DeviceKind::NsoGameCube => MixSource::Procon,
            };
            (source, snapshot.buttons)
        };

        let map = match source {
            MixSource::DualJoycons => &self.maps.dual_joycons,
            MixSource::SingleLeft => &self.maps.single_joycon_l,
            MixSource::SingleRight => &self.maps.single_joycon_r,
            MixSource::Procon => &self.maps.procon,
        };

        let (left_stick, right_stick) = if devices_len == 1 {
            (sideways_left_stick(session.kind(), snapshot.left_stick, snapshot.right_stick), (0.0, 0.0))
        } else {
            (snapshot.left_stick, snapshot.right_stick)
        };

        let report = match self.mode {
            GamepadMode::X360 => {
                let (mut report, _) = apply_map_x360(mixed_buttons, map);
                report.thumb_lx = stick_to_i16(left_stick.0);
                report.thumb_ly = stick_to_i16(left_stick.1);
                report.thumb_rx = stick_to_i16(right_stick.0);
                report.thumb_ry = stick_to_i16(right_stick.1);
                GamepadReport::X360(report)
            }
            GamepadMode::Ds4 => {
                let mut report = apply_map_ds4(mixed_buttons, map);
                report.thumb_lx = stick_to_u8(left_stick.0);
                report.thumb_ly = stick_to_u8(-left_stick.1);
                report.thumb_rx = stick_to_u8(right_stick.0);
                report.thumb_ry = stick_to_u8(-right_stick.1);
                if self.motion_controls {
                    report.accel = (snapshot.accelerometer.x, snapshot.accelerometer.z, -snapshot.accelerometer.y);
                    report.gyro = (snapshot.gyroscope.x, snapshot.gyroscope.z, -snapshot.gyroscope.y);
                }
                GamepadReport::Ds4(report)
            }
        };

        if let Err(e) = self.sink.update(report) {
            log::warn!("gamepad sink update failed: {e}");
        }
    }

    /// Wire the sink's rumble callback into this pad's pump. Call once after
    /// construction, before any input arrives.
    pub fn register_rumble(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.sink.register_rumble_callback(Arc::new(move |large, small| {
            if let Some(this) = weak.upgrade() {
                this.rumble.lock().unwrap().request(large, small);
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ButtonMaps, MouseConfig, MouseSideConfig, MouseButtonConfig};
    use crate::gamepad::MockGamepadSink;
    use std::collections::HashMap;

    fn minimal_button_map(entries: &[(&str, &str)]) -> ButtonMap {
        let mut map = HashMap::new();
        for (k, v) in entries {
            map.insert(k.to_string(), Some(ButtonTarget::Button(v.to_string())));
        }
        map
    }

    fn test_config() -> Config {
        Config {
            mode: GamepadMode::X360,
            combine_joycons: true,
            deadzone: 150,
            motion_controls: false,
            mouse: MouseConfig {
                enabled: false,
                sensitivity: 1.0,
                scroll_sensitivity: 1.0,
                buttons: MouseSideConfig {
                    left_joycon: MouseButtonConfig { left_button: "ZL".into(), middle_button: "L".into(), right_button: "CAPT".into() },
                    right_joycon: MouseButtonConfig { left_button: "ZR".into(), middle_button: "R".into(), right_button: "HOME".into() },
                },
                roughness_threshold: 4000,
                distance_max: 1000,
            },
            buttons: ButtonMaps {
                dual_joycons: minimal_button_map(&[("A", "A"), ("B", "B")]),
                single_joycon_l: minimal_button_map(&[("LEFT", "X")]),
                single_joycon_r: minimal_button_map(&[("A", "A")]),
                procon: minimal_button_map(&[("A", "A")]),
            },
        }
    }

    #[test]
    fn dpad_table_covers_eight_octants_and_center() {
        assert_eq!(dpad_from_pressed(true, false, false, false), DpadDirection::North);
        assert_eq!(dpad_from_pressed(false, false, false, false), DpadDirection::Centered);
        assert_eq!(dpad_from_pressed(true, true, false, false), DpadDirection::Centered);
    }

    #[test]
    fn sideways_right_joycon_rotates_90_ccw() {
        let out = sideways_left_stick(DeviceKind::JoyconRight, (0.0, 0.0), (1.0, 0.0));
        assert!((out.0 - 0.0).abs() < 1e-6);
        assert!((out.1 - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn sideways_left_joycon_rotates_90_cw() {
        let out = sideways_left_stick(DeviceKind::JoyconLeft, (1.0, 0.0), (0.0, 0.0));
        assert!((out.0 - 0.0).abs() < 1e-6);
        assert!((out.1 - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn dual_joycon_button_merge_ors_sides_and_shrinks_on_removal() {
        let rt = Handle::current();
        let sink = Arc::new(MockGamepadSink::new());
        let vc: VirtualController<MockGamepadSink> = VirtualController::new(1, &test_config(), sink.clone(), rt);

        let left_transport: Arc<dyn crate::transport::Transport> = Arc::new(NullTransport::default());
        let right_transport: Arc<dyn crate::transport::Transport> = Arc::new(NullTransport::default());
        let left = Arc::new(DeviceSession::new(left_transport, DeviceKind::JoyconLeft, crate::buttons::ButtonEncoding::Ble, 150));
        let right = Arc::new(DeviceSession::new(right_transport, DeviceKind::JoyconRight, crate::buttons::ButtonEncoding::Ble, 150));

        vc.add_controller(left.clone()).unwrap();
        vc.add_controller(right.clone()).unwrap();

        let mut snap_a = InputSnapshot::default();
        snap_a.buttons = SwitchButtons::A;
        vc.handle_snapshot(&left, snap_a);

        let mut snap_b = InputSnapshot::default();
        snap_b.buttons = SwitchButtons::B;
        vc.handle_snapshot(&right, snap_b);

        let report = sink.last_report().unwrap();
        if let GamepadReport::X360(r) = report {
            assert_ne!(r.buttons & crate::gamepad::X360Buttons::A.bits(), 0);
            assert_ne!(r.buttons & crate::gamepad::X360Buttons::B.bits(), 0);
        } else {
            panic!("expected X360 report");
        }

        let (removed, emptied) = vc.remove_controller(right.id());
        assert!(removed);
        assert!(!emptied);
        let mut snap_c = InputSnapshot::default();
        snap_c.buttons = SwitchButtons::A;
        vc.handle_snapshot(&left, snap_c);
        if let GamepadReport::X360(r) = sink.last_report().unwrap() {
            assert_eq!(r.buttons & crate::gamepad::X360Buttons::B.bits(), 0);
        }
        let (removed, emptied) = vc.remove_controller(left.id());
        assert!(removed);
        assert!(emptied);
    }

    #[derive(Default)]
    struct NullTransport;

    #[async_trait::async_trait]
    impl crate::transport::Transport for NullTransport {
        async fn write(&self, _channel: crate::transport::Channel, _payload: &[u8]) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
        fn input_reports(&self) -> crossbeam_channel::Receiver<Vec<u8>> {
            crossbeam_channel::bounded(1).1
        }
        fn command_responses(&self) -> crossbeam_channel::Receiver<Vec<u8>> {
            crossbeam_channel::bounded(1).1
        }
        async fn disconnect(&self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
    }
}
