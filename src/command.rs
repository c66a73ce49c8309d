//! Frames commands, correlates the single outstanding response per session,
//! and times out. Grounded in `controller.py::write_command`: responses
//! correlate by arrival order, never by matching an id in the reply.

use crate::error::CommandError;
use crate::transport::{Channel, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fixed inter-command pacing, matching the teacher's `COMMAND_DELAY_MS`.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

/// Serializes command writes over one [`Transport`]: at most one outstanding
/// command at a time.
pub struct CommandChannel {
    transport: Arc<dyn Transport>,
    outstanding: AtomicBool,
}

impl CommandChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport, outstanding: AtomicBool::new(false) }
    }

    /// Frame `[cmd_id][0x91][0x01][sub_id][0x00][len][0x00][0x00][payload]`,
    /// write it, and await the single reply. Fails immediately (without
    /// touching the transport) if a command is already outstanding.
    pub async fn send(
        &self,
        cmd_id: u8,
        sub_id: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>, CommandError> {
        if self
            .outstanding
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CommandError::AlreadyOutstanding);
        }
        let result = self.send_inner(cmd_id, sub_id, payload).await;
        self.outstanding.store(false, Ordering::SeqCst);
        result
    }

    async fn send_inner(
        &self,
        cmd_id: u8,
        sub_id: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>, CommandError> {
        let mut frame = vec![cmd_id, 0x91, 0x01, sub_id, 0x00, payload.len() as u8, 0x00, 0x00];
        frame.extend_from_slice(payload);

        self.transport.write(Channel::Command, &frame).await?;

        let responses = self.transport.command_responses();
        let response = tokio::task::spawn_blocking(move || {
            responses.recv_timeout(COMMAND_TIMEOUT)
        })
        .await
        .map_err(|_| CommandError::Timeout)?
        .map_err(|_| CommandError::Timeout)?;

        if response.len() < 8 {
            return Err(CommandError::UnexpectedResponse(format!(
                "response too short: {} bytes",
                response.len()
            )));
        }
        if response[0] != cmd_id || response[1] != 0x01 {
            return Err(CommandError::UnexpectedResponse(format!(
                "expected echo [{cmd_id:#04x}, 0x01], got [{:#04x}, {:#04x}]",
                response[0], response[1]
            )));
        }
        Ok(response)
    }
}
