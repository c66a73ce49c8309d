//! Error taxonomy. Each component gets its own `thiserror` enum, matching the
//! teacher's `BackendError`/`ConfigError` split; `anyhow` is reserved for the
//! binary boundary in `main`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport connect failed: {0}")]
    Connect(String),
    #[error("transport write failed: {0}")]
    Write(String),
    #[error("transport closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("command timed out waiting for a response")]
    Timeout,
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("a command is already outstanding on this session")]
    AlreadyOutstanding,
    #[error("invalid command argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("input frame too short: got {got} bytes, need at least {need}")]
    FrameTooShort { got: usize, need: usize },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("session is already connected")]
    AlreadyConnected,
}

#[derive(Debug, Error)]
pub enum VirtualControllerError {
    #[error("virtual controller slot already holds two devices")]
    CapacityExceeded,
    #[error("a single left Joy-Con can only combine with a single right Joy-Con, or vice versa")]
    IncompatibleCombination,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    VirtualController(#[from] VirtualControllerError),
    #[error("no free virtual-pad slots remain")]
    NoFreeSlots,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("gamepad sink operation failed: {0}")]
    Operation(String),
}
