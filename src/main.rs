//! switch2-bridge entry point: loads configuration, scans for Switch 2
//! controllers over BLE and polls for a wired Pro Controller 2 over USB, and
//! relays their decoded input into the virtual-controller aggregator. One
//! dedicated OS thread per connected device reads its notification channel,
//! mirroring the teacher's per-controller handler threads in `manager.rs`;
//! the emitted gamepad is a recording mock sink until a real ViGEm/vJoy
//! backend is wired in behind `VirtualGamepadSink`.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use switch2_bridge::buttons::{side_buttons_pressed, ButtonEncoding};
use switch2_bridge::config::Config;
use switch2_bridge::discovery::{scan_for_advertisement, Supervisor};
use switch2_bridge::gamepad::MockGamepadSink;
use switch2_bridge::protocol::{FEATURE_MOTION, FEATURE_MOUSE, FEATURE_VIBRATION};
use switch2_bridge::session::{DeviceKind, DeviceSession};
use switch2_bridge::transport::ble::{BleTransport, VibrationTarget};
use switch2_bridge::transport::usb::{find_pro_controller2, UsbTransport};
use tokio::runtime::Handle;

/// How often to poll for a wired Pro Controller 2 while none is attached.
const USB_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "switch2-bridge.toml".to_string());
    let config = Config::load(&config_path).with_context(|| format!("loading config from {config_path}"))?;
    info!("loaded configuration from {config_path}");

    let supervisor = Arc::new(Supervisor::new(&config, Handle::current(), |player| {
        info!("virtual pad slot {player} attached to a mock gamepad sink");
        Arc::new(MockGamepadSink::new())
    }));

    tokio::spawn(usb_poll_loop(config.clone(), supervisor.clone()));

    info!("scanning for Switch 2 controllers; press the sync button");
    loop {
        if let Err(e) = scan_and_admit_one(&config, &supervisor).await {
            error!("discovery round failed: {e}");
        }
    }
}

async fn scan_and_admit_one(config: &Config, supervisor: &Arc<Supervisor<MockGamepadSink>>) -> Result<()> {
    let (kind, peripheral, reconnect_mac) = scan_for_advertisement().await.context("scanning for advertisement")?;

    let vibration_target = match kind {
        DeviceKind::JoyconLeft => VibrationTarget::JoyconLeft,
        DeviceKind::JoyconRight | DeviceKind::NsoGameCube => VibrationTarget::JoyconRight,
        DeviceKind::ProController2 => VibrationTarget::ProController2,
    };
    let transport = Arc::new(BleTransport::connect(peripheral, vibration_target).await.context("connecting transport")?);
    let session = Arc::new(DeviceSession::new(transport, kind, ButtonEncoding::Ble, config.deadzone));
    session.connect().await.context("device handshake")?;

    if reconnect_mac == 0 {
        session.pair([0, 0, 0, 0, 0, 0]).await.context("pairing")?;
    }
    session
        .enable_features(FEATURE_MOTION | FEATURE_VIBRATION | FEATURE_MOUSE)
        .await
        .context("enabling features")?;

    let input_reports = session.input_reports();
    let session_for_probe = session.clone();
    let side_buttons_held = tokio::task::spawn_blocking(move || input_reports.recv().ok())
        .await
        .ok()
        .flatten()
        .and_then(|frame| session_for_probe.decode(&frame).ok())
        .map(|(snapshot, _)| side_buttons_pressed(snapshot.buttons))
        .unwrap_or(false);

    admit_and_relay(config, supervisor, session, side_buttons_held).await
}

/// Poll for a wired Pro Controller 2 while none is attached. USB has no
/// advertisement/pairing concept; the controller is reachable the moment
/// it's plugged in, so `admit_usb_session` skips straight to the feature
/// enable + admit steps `scan_and_admit_one` does after pairing.
async fn usb_poll_loop(config: Config, supervisor: Arc<Supervisor<MockGamepadSink>>) {
    let usb_attached = Arc::new(AtomicBool::new(false));
    loop {
        if !usb_attached.load(Ordering::SeqCst) {
            match admit_usb_session(&config, &supervisor, &usb_attached).await {
                Ok(true) => {}
                Ok(false) => {}
                Err(e) => warn!("USB probe failed: {e}"),
            }
        }
        tokio::time::sleep(USB_POLL_INTERVAL).await;
    }
}

/// Returns `Ok(true)` if a Pro Controller 2 was found and admitted.
async fn admit_usb_session(
    config: &Config,
    supervisor: &Arc<Supervisor<MockGamepadSink>>,
    usb_attached: &Arc<AtomicBool>,
) -> Result<bool> {
    let Some(device) = find_pro_controller2().context("enumerating USB HID devices")? else {
        return Ok(false);
    };
    let transport = Arc::new(UsbTransport::new(device).context("opening USB transport")?);
    let session = Arc::new(DeviceSession::new(transport, DeviceKind::ProController2, ButtonEncoding::Usb, config.deadzone));
    session.connect().await.context("USB device handshake")?;
    session
        .enable_features(FEATURE_MOTION | FEATURE_VIBRATION | FEATURE_MOUSE)
        .await
        .context("enabling features")?;

    usb_attached.store(true, Ordering::SeqCst);
    let cleanup_flag = usb_attached.clone();
    admit_and_relay_with_cleanup(config, supervisor, session, false, move || cleanup_flag.store(false, Ordering::SeqCst))
        .await?;
    Ok(true)
}

async fn admit_and_relay(
    config: &Config,
    supervisor: &Arc<Supervisor<MockGamepadSink>>,
    session: Arc<DeviceSession>,
    side_buttons_pressed: bool,
) -> Result<()> {
    admit_and_relay_with_cleanup(config, supervisor, session, side_buttons_pressed, || {}).await
}

/// Admits `session` into a virtual-pad slot and spawns the dedicated OS
/// thread that relays its decoded input for as long as it stays connected.
/// `on_disconnect` runs on that thread once the relay loop exits, after the
/// slot has been freed.
async fn admit_and_relay_with_cleanup(
    config: &Config,
    supervisor: &Arc<Supervisor<MockGamepadSink>>,
    session: Arc<DeviceSession>,
    side_buttons_pressed: bool,
    on_disconnect: impl FnOnce() + Send + 'static,
) -> Result<()> {
    let player = supervisor.admit(config, session.clone(), side_buttons_pressed).await.context("admitting device")?;
    info!("admitted {:?} to player {player}", session.kind());

    let controller = supervisor
        .controller_for(player)
        .await
        .expect("just admitted to this slot");
    let supervisor = supervisor.clone();
    let session_for_thread = session.clone();
    let handle = Handle::current();
    thread::Builder::new()
        .name(format!("input-player{player}"))
        .spawn(move || {
            let input_reports = session_for_thread.input_reports();
            while let Ok(data) = input_reports.recv() {
                match session_for_thread.decode(&data) {
                    Ok((snapshot, _)) => controller.handle_snapshot(&session_for_thread, snapshot),
                    Err(e) => warn!("dropped malformed input frame: {e}"),
                }
            }
            handle.block_on(supervisor.remove(session_for_thread.id()));
            info!("{:?} disconnected", session_for_thread.kind());
            on_disconnect();
        })
        .context("spawning input relay thread")?;

    Ok(())
}
