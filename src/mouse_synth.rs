//! Optional mouse synthesis from a Joy-Con's optical sensor (base spec §4.9).
//! Tracks per-device mouse-mode state and the three configured mouse-button
//! transitions, suppressing the consumed stick/buttons from the stream that
//! reaches the virtual-controller mixer.

use crate::buttons::{switch_button_from_name, SwitchButtons};
use crate::codec::looping_diff_16;
use crate::config::{MouseButtonConfig, MouseConfig};
use crate::input::InputSnapshot;
use crate::mouse_sink::{MouseButton, MouseSink};
use crate::session::DeviceKind;
use std::collections::HashMap;
use std::sync::Mutex;

struct DeviceMouseState {
    in_mouse_mode: bool,
    prev_xy: (u16, u16),
    prev_left: bool,
    prev_middle: bool,
    prev_right: bool,
}

impl Default for DeviceMouseState {
    fn default() -> Self {
        Self { in_mouse_mode: false, prev_xy: (0, 0), prev_left: false, prev_middle: false, prev_right: false }
    }
}

/// Resolved mouse-button config for one Joy-Con side: bits instead of names,
/// looked up once instead of on every frame.
struct ResolvedMouseButtons {
    left: SwitchButtons,
    middle: SwitchButtons,
    right: SwitchButtons,
}

fn resolve(cfg: &MouseButtonConfig) -> ResolvedMouseButtons {
    ResolvedMouseButtons {
        left: switch_button_from_name(&cfg.left_button).unwrap_or(SwitchButtons::empty()),
        middle: switch_button_from_name(&cfg.middle_button).unwrap_or(SwitchButtons::empty()),
        right: switch_button_from_name(&cfg.right_button).unwrap_or(SwitchButtons::empty()),
    }
}

/// Owns mouse-mode state for every Joy-Con attached to a virtual pad.
/// Config is validated at startup, so button names here always resolve.
pub struct MouseSynthesizer {
    config: MouseConfig,
    left_buttons: ResolvedMouseButtons,
    right_buttons: ResolvedMouseButtons,
    devices: Mutex<HashMap<u64, DeviceMouseState>>,
}

impl MouseSynthesizer {
    pub fn new(config: MouseConfig) -> Self {
        let left_buttons = resolve(&config.buttons.left_joycon);
        let right_buttons = resolve(&config.buttons.right_joycon);
        Self { config, left_buttons, right_buttons, devices: Mutex::new(HashMap::new()) }
    }

    /// Process one snapshot from a lone Joy-Con before it reaches the mixer.
    /// Mutates `snapshot` in place: zeroes the device's own stick and strips
    /// the three configured mouse buttons whenever mouse mode is active.
    /// Returns `false` if mouse synthesis is disabled or `kind` is not a
    /// Joy-Con, in which case `snapshot` is left untouched.
    pub fn process(&self, device_id: u64, kind: DeviceKind, snapshot: &mut InputSnapshot, sink: &dyn MouseSink) -> bool {
        if !self.config.enabled || !kind.is_joycon() {
            return false;
        }
        let buttons = if kind.is_joycon_left() { &self.left_buttons } else { &self.right_buttons };

        let mut devices = self.devices.lock().unwrap();
        let state = devices.entry(device_id).or_default();

        let in_range = snapshot.mouse_distance > 0
            && snapshot.mouse_distance < self.config.distance_max
            && snapshot.mouse_roughness < self.config.roughness_threshold;

        if !in_range {
            state.in_mouse_mode = false;
            return false;
        }

        let cur_xy = (snapshot.mouse_x, snapshot.mouse_y);
        if state.in_mouse_mode {
            let dx = looping_diff_16(state.prev_xy.0, cur_xy.0);
            let dy = looping_diff_16(state.prev_xy.1, cur_xy.1);
            let scaled_dx = (dx as f32 * self.config.sensitivity).round() as i32;
            let scaled_dy = (dy as f32 * self.config.sensitivity).round() as i32;
            if scaled_dx != 0 || scaled_dy != 0 {
                let _ = sink.move_relative(scaled_dx, scaled_dy);
            }
        }
        state.in_mouse_mode = true;
        state.prev_xy = cur_xy;

        let stick = if kind.is_joycon_left() { snapshot.left_stick } else { snapshot.right_stick };
        if stick.1.abs() > 0.2 {
            let wheel = (stick.1 * 60.0 * self.config.scroll_sensitivity).round() as i32;
            let _ = sink.scroll(wheel);
        }
        if kind.is_joycon_left() {
            snapshot.left_stick = (0.0, 0.0);
        } else {
            snapshot.right_stick = (0.0, 0.0);
        }

        transition(sink, MouseButton::Left, snapshot.buttons.contains(buttons.left), &mut state.prev_left);
        transition(sink, MouseButton::Middle, snapshot.buttons.contains(buttons.middle), &mut state.prev_middle);
        transition(sink, MouseButton::Right, snapshot.buttons.contains(buttons.right), &mut state.prev_right);

        snapshot.buttons.remove(buttons.left | buttons.middle | buttons.right);
        true
    }
}

fn transition(sink: &dyn MouseSink, button: MouseButton, pressed: bool, prev: &mut bool) {
    if pressed && !*prev {
        let _ = sink.button_down(button);
    } else if !pressed && *prev {
        let _ = sink.button_up(button);
    }
    *prev = pressed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MouseSideConfig;
    use crate::mouse_sink::{MockMouseSink, MouseEvent};

    fn config() -> MouseConfig {
        MouseConfig {
            enabled: true,
            sensitivity: 1.0,
            scroll_sensitivity: 1.0,
            buttons: MouseSideConfig {
                left_joycon: MouseButtonConfig {
                    left_button: "ZL".into(),
                    middle_button: "L".into(),
                    right_button: "CAPT".into(),
                },
                right_joycon: MouseButtonConfig {
                    left_button: "ZR".into(),
                    middle_button: "R".into(),
                    right_button: "HOME".into(),
                },
            },
            roughness_threshold: 4000,
            distance_max: 1000,
        }
    }

    fn snapshot(distance: u16, roughness: u16, xy: (u16, u16)) -> InputSnapshot {
        InputSnapshot { mouse_distance: distance, mouse_roughness: roughness, mouse_x: xy.0, mouse_y: xy.1, ..Default::default() }
    }

    #[test]
    fn out_of_range_distance_leaves_snapshot_untouched() {
        let synth = MouseSynthesizer::new(config());
        let sink = MockMouseSink::new();
        let mut snap = snapshot(1500, 0, (100, 100));
        snap.buttons = SwitchButtons::ZL;
        let active = synth.process(1, DeviceKind::JoyconLeft, &mut snap, &sink);
        assert!(!active);
        assert!(snap.buttons.contains(SwitchButtons::ZL));
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[test]
    fn in_range_distance_suppresses_configured_buttons_and_moves_cursor() {
        let synth = MouseSynthesizer::new(config());
        let sink = MockMouseSink::new();
        let mut first = snapshot(500, 0, (100, 100));
        synth.process(1, DeviceKind::JoyconLeft, &mut first, &sink);

        let mut second = snapshot(500, 0, (110, 90));
        second.buttons = SwitchButtons::ZL | SwitchButtons::A;
        let active = synth.process(1, DeviceKind::JoyconLeft, &mut second, &sink);

        assert!(active);
        assert!(!second.buttons.contains(SwitchButtons::ZL));
        assert!(second.buttons.contains(SwitchButtons::A));
        let events = sink.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, MouseEvent::Move(10, -10))));
        assert!(events.iter().any(|e| matches!(e, MouseEvent::ButtonDown(MouseButton::Left))));
    }

    #[test]
    fn exits_mouse_mode_when_distance_leaves_range() {
        let synth = MouseSynthesizer::new(config());
        let sink = MockMouseSink::new();
        let mut in_range = snapshot(500, 0, (100, 100));
        synth.process(1, DeviceKind::JoyconLeft, &mut in_range, &sink);

        let mut out = snapshot(1500, 0, (100, 100));
        out.buttons = SwitchButtons::ZL;
        let active = synth.process(1, DeviceKind::JoyconLeft, &mut out, &sink);
        assert!(!active);
        assert!(out.buttons.contains(SwitchButtons::ZL));
    }
}
