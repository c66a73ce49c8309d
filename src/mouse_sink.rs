//! The opaque "OS mouse-input injection" collaborator named in the purpose
//! statement's non-goal list. Same trait-plus-mock shape as
//! [`crate::gamepad::VirtualGamepadSink`], grounded in the teacher's
//! `MouseBackend`/`MockMouseBackend`.

use crate::error::SinkError;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

pub trait MouseSink: Send + Sync {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), SinkError>;
    fn scroll(&self, delta: i32) -> Result<(), SinkError>;
    fn button_down(&self, button: MouseButton) -> Result<(), SinkError>;
    fn button_up(&self, button: MouseButton) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEvent {
    Move(i32, i32),
    Scroll(i32),
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
}

#[derive(Default)]
pub struct MockMouseSink {
    pub events: Mutex<Vec<MouseEvent>>,
}

impl MockMouseSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MouseSink for MockMouseSink {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(MouseEvent::Move(dx, dy));
        Ok(())
    }

    fn scroll(&self, delta: i32) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(MouseEvent::Scroll(delta));
        Ok(())
    }

    fn button_down(&self, button: MouseButton) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(MouseEvent::ButtonDown(button));
        Ok(())
    }

    fn button_up(&self, button: MouseButton) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(MouseEvent::ButtonUp(button));
        Ok(())
    }
}
