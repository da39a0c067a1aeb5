use std::time::Instant;

use tracing::{debug, info, warn};

use super::rumble::{HapticCommand, RumbleState, HAPTIC_DURATION};
use crate::controller::input_transform::{ButtonLayout, InputTransform, TransformSettings};
use crate::controller::{DeviceInfo, Haptics, InstanceId, PadAxis, PadButton};
use crate::error::TransportError;
use crate::protocol::{encode_report, ControllerReport, FrameDecoder, RumbleSample};
use crate::serial::Transport;

/// Lifecycle of a session's serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No port assigned yet.
    Unbound,
    /// Port assigned, first open pending.
    Connecting,
    Connected,
    /// Port assigned but the link is down; reopened on a backoff.
    Waiting,
    Closed,
}

/// One connected controller and everything the bridge keeps for it.
pub struct ControllerSession {
    device: DeviceInfo,
    state: SessionState,
    report: ControllerReport,
    transform: InputTransform,
    rumble: RumbleState,
    decoder: FrameDecoder,
    port: Option<String>,
    transport: Option<Box<dyn Transport>>,
    last_send: Option<Instant>,
    last_reconnect: Option<Instant>,
    read_buffer: Vec<u8>,
    zero_pending: bool,
}

impl ControllerSession {
    pub fn new(device: DeviceInfo, settings: TransformSettings, layout: ButtonLayout) -> Self {
        Self {
            device,
            state: SessionState::Unbound,
            report: ControllerReport::default(),
            transform: InputTransform::new(settings, layout),
            rumble: RumbleState::new(),
            decoder: FrameDecoder::new(),
            port: None,
            transport: None,
            last_send: None,
            last_reconnect: None,
            read_buffer: Vec::new(),
            zero_pending: false,
        }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn instance(&self) -> InstanceId {
        self.device.instance
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn report(&self) -> &ControllerReport {
        &self.report
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn layout(&self) -> ButtonLayout {
        self.transform.layout()
    }

    pub fn rumble(&self) -> &RumbleState {
        &self.rumble
    }

    /// Telemetry candidates thrown away by resync on this session.
    pub fn rejected_frames(&self) -> u64 {
        self.decoder.rejected()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn apply_button(&mut self, button: PadButton, pressed: bool) {
        if self.transform.apply_button(button, pressed, &mut self.report) {
            debug!(
                "Controller {}: {:?} {}",
                self.device.instance,
                button,
                if pressed { "pressed" } else { "released" }
            );
        }
    }

    pub fn apply_axis(&mut self, axis: PadAxis, value: i16) {
        self.transform.apply_axis(axis, value, &mut self.report);
    }

    pub fn set_layout(&mut self, layout: ButtonLayout) {
        self.transform.set_layout(layout, &mut self.report);
    }

    pub fn zero_sticks(&mut self) -> [i16; 4] {
        self.zero_pending = false;
        self.transform.zero_sticks(&mut self.report)
    }

    /// Zero the sticks once the initial axis snapshot has been applied.
    pub fn request_zero(&mut self) {
        self.zero_pending = true;
    }

    pub fn settle_zero(&mut self) -> Option<[i16; 4]> {
        if !self.zero_pending {
            return None;
        }
        Some(self.zero_sticks())
    }

    /// Record the port this session should talk to. The link opens on the
    /// next service pass.
    pub fn bind(&mut self, port: String) {
        info!(
            "Controller {} ({}) bound to {}",
            self.device.index, self.device.guid, port
        );
        self.port = Some(port);
        self.state = SessionState::Connecting;
    }

    /// Attach a freshly opened transport.
    pub fn attach(&mut self, transport: Box<dyn Transport>, now: Instant) {
        info!(
            "Controller {} (id {}, inst {}) paired to {}",
            self.device.index,
            self.device.guid,
            self.device.instance,
            transport.path()
        );
        self.transport = Some(transport);
        self.decoder.clear();
        self.last_reconnect = Some(now);
        self.last_send = None;
        self.state = SessionState::Connected;
    }

    /// An open attempt failed; retry after the reconnect interval.
    pub fn open_failed(&mut self, error: &TransportError, now: Instant) {
        warn!(
            "Controller {} waiting for {}: {}",
            self.device.index,
            self.port.as_deref().unwrap_or("?"),
            error
        );
        self.last_reconnect = Some(now);
        self.state = SessionState::Waiting;
    }

    /// Whether the reconnect backoff has elapsed.
    pub fn reconnect_due(&self, now: Instant, interval: std::time::Duration) -> bool {
        if self.port.is_none() || self.transport.is_some() {
            return false;
        }
        match self.state {
            SessionState::Connecting => true,
            SessionState::Waiting => self
                .last_reconnect
                .map_or(true, |t| now.saturating_duration_since(t) > interval),
            _ => false,
        }
    }

    pub fn mark_reconnect_attempt(&mut self, now: Instant) {
        self.last_reconnect = Some(now);
    }

    /// Close the transport and silence haptics, keeping the port binding.
    pub fn drop_link<H: Haptics + ?Sized>(&mut self, haptics: &mut H, now: Instant) {
        self.transport = None;
        self.decoder.clear();
        self.stop_rumble(haptics);
        self.last_reconnect = Some(now);
        self.state = SessionState::Waiting;
    }

    /// Port disappeared: close everything and forget the binding.
    pub fn unbind<H: Haptics + ?Sized>(&mut self, haptics: &mut H, now: Instant) -> Option<String> {
        self.drop_link(haptics, now);
        self.state = SessionState::Unbound;
        self.port.take()
    }

    /// Send the report when the cadence allows, then drain telemetry and feed
    /// the newest sample to the rumble state.
    pub fn service<H: Haptics + ?Sized>(
        &mut self,
        haptics: &mut H,
        now: Instant,
        interval: std::time::Duration,
    ) -> Result<(), TransportError> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(());
        };

        let send_due = self
            .last_send
            .map_or(true, |t| now.saturating_duration_since(t) >= interval);
        if send_due {
            match transport.write_frame(&encode_report(&self.report)) {
                Ok(()) => self.last_send = Some(now),
                // Nothing of this report reached the wire; the next one goes
                // out on the following cadence slot
                Err(TransportError::WouldBlock { path }) => {
                    debug!("{} busy, dropping one report", path);
                    self.last_send = Some(now);
                }
                Err(e) => return Err(e),
            }
        }

        self.read_buffer.clear();
        transport.read_available(&mut self.read_buffer)?;
        self.decoder.extend(&self.read_buffer);

        let command = match self.decoder.latest_payload() {
            Some(payload) => Some(
                self.rumble
                    .on_sample(RumbleSample::from_payload(&payload), now),
            ),
            None => self.rumble.on_quiet_tick(now),
        };
        if let Some(command) = command {
            self.play(haptics, command);
        }
        Ok(())
    }

    fn play<H: Haptics + ?Sized>(&self, haptics: &mut H, command: HapticCommand) {
        let instance = self.device.instance;
        let result = match command {
            HapticCommand::Play { low, high } => {
                haptics.rumble(instance, low, high, HAPTIC_DURATION)
            }
            HapticCommand::Stop => haptics.stop_rumble(instance),
        };
        match (command, result) {
            (_, Ok(())) => {}
            (HapticCommand::Stop, Err(e)) => {
                warn!("Stopping rumble for controller {} failed: {}", instance, e)
            }
            (HapticCommand::Play { .. }, Err(e)) => {
                debug!("Rumble for controller {} failed: {}", instance, e)
            }
        }
    }

    pub fn stop_rumble<H: Haptics + ?Sized>(&mut self, haptics: &mut H) {
        self.rumble.silence();
        self.play(haptics, HapticCommand::Stop);
    }

    /// Final teardown on controller disconnect or shutdown.
    pub fn close<H: Haptics + ?Sized>(&mut self, haptics: &mut H) {
        self.transport = None;
        self.stop_rumble(haptics);
        self.state = SessionState::Closed;
    }
}
