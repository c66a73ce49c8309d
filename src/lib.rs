//! switch2-bridge: Nintendo Switch 2 controller to virtual-gamepad bridge.
//!
//! Discovers Joy-Con 2 / Pro Controller 2 / NSO GameCube controllers over
//! BLE (or USB for the Pro Controller 2), decodes their proprietary input
//! protocol, and re-emits their state as standard virtual gamepads.

pub mod buttons;
pub mod calibration;
pub mod codec;
pub mod command;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gamepad;
pub mod input;
pub mod mouse_sink;
pub mod mouse_synth;
pub mod protocol;
pub mod rumble;
pub mod session;
pub mod transport;
pub mod vibration;
pub mod virtual_controller;

pub use config::Config;
pub use discovery::Supervisor;
pub use gamepad::{GamepadReport, MockGamepadSink, VirtualGamepadSink};
pub use session::{DeviceKind, DeviceSession};
pub use virtual_controller::VirtualController;
