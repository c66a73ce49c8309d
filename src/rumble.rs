//! Repeats or stops vibration frames with epoch-based supersession.
//! Grounded in `examples/original_source/virtual_controller.py`'s
//! `send_vibration_task`/epoch handoff.

use crate::session::DeviceSession;
use crate::vibration::VibrationFrame;
use log::warn;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::sleep;

const CADENCE: Duration = Duration::from_millis(20);
const MAX_ITERATIONS: u32 = 500;

/// Drives vibration writes to 1-2 device sessions belonging to one virtual
/// pad slot. Each call to [`RumblePump::request`] bumps the epoch, signaling
/// any in-flight pump loop to stop before (maybe) starting a new one.
///
/// Holds an explicit runtime [`Handle`] rather than relying on `tokio::spawn`
/// so it can be driven from the gamepad sink's rumble callback, which may run
/// on a thread with no entered runtime (the sink is an external collaborator).
pub struct RumblePump {
    sessions: Vec<Arc<DeviceSession>>,
    epoch: Arc<AtomicU64>,
    handle: Handle,
}

impl RumblePump {
    pub fn new(sessions: Vec<Arc<DeviceSession>>, handle: Handle) -> Self {
        Self { sessions, epoch: Arc::new(AtomicU64::new(0)), handle }
    }

    /// Replace the attached sessions (e.g. when a second Joy-Con joins or
    /// leaves the slot) without disturbing the current epoch counter.
    pub fn set_sessions(&mut self, sessions: Vec<Arc<DeviceSession>>) {
        self.sessions = sessions;
    }

    /// Handle a `(large_motor, small_motor)` callback from the gamepad sink.
    pub fn request(&self, large_motor: u8, small_motor: u8) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = VibrationFrame::from_motor_amplitudes(large_motor, small_motor);

        if frame.is_silent() {
            let sessions = self.sessions.clone();
            self.handle.spawn(async move {
                for session in &sessions {
                    if let Err(e) = session.set_vibration(frame).await {
                        warn!("rumble stop write failed: {e}");
                    }
                }
            });
            return;
        }

        let sessions = self.sessions.clone();
        let epoch_flag = self.epoch.clone();
        self.handle.spawn(async move {
            for _ in 0..MAX_ITERATIONS {
                if epoch_flag.load(Ordering::SeqCst) != epoch {
                    break;
                }
                let writes = sessions.iter().map(|session| {
                    let session = session.clone();
                    async move {
                        if let Err(e) = session.set_vibration(frame).await {
                            warn!("rumble write failed: {e}");
                        }
                    }
                });
                futures::future::join_all(writes).await;
                sleep(CADENCE).await;
            }
        });
    }

    #[cfg(test)]
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}
