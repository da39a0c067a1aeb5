//! Bridge scheduler with statum lifecycle
//!
//! One cooperative loop owns every transport and every session. Each tick:
//!
//! 1. drain input events into the session manager
//! 2. rescan serial ports when the scan interval elapsed
//! 3. pair sessions that have no port yet
//! 4. service every session (reconnect, send, receive, rumble)
//!
//! Between ticks the loop sleeps for a millisecond.

use std::time::{Duration, Instant};

use statum::{machine, state};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::console::BridgeCommand;
use crate::controller::InputBackend;
use crate::serial::port_registry::PortState;
use crate::serial::{PortFilter, PortProvider};
use crate::session::{SessionManager, SessionState, SessionStatus, ToggleRefused};

/// Pause between two ticks.
pub const TICK_SLEEP: Duration = Duration::from_millis(1);

#[state]
#[derive(Debug, Clone)]
pub enum BridgeState {
    Initializing, // Collaborators wired, no device opened yet
    Running,      // Loop active
}

/// The bridge loop and everything it owns.
#[machine]
pub struct Bridge<S: BridgeState> {
    backend: Box<dyn InputBackend>,
    ports: Box<dyn PortProvider>,
    filter: PortFilter,
    manager: SessionManager,
    scan_interval: Duration,
    last_scan: Option<Instant>,
}

impl<S: BridgeState> Bridge<S> {
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Discover ports and reconcile the pool with them.
    fn rescan(&mut self, now: Instant) {
        self.last_scan = Some(now);
        if !self.manager.registry().policy().auto_discovery {
            return;
        }
        let discovered = match self.ports.discover() {
            Ok(ports) => self.filter.apply(ports),
            Err(e) => {
                warn!("Port scan failed: {}", e);
                return;
            }
        };
        let outcome = self
            .manager
            .rescan(&discovered, self.backend.as_mut(), now);
        if !outcome.removed.is_empty() || !outcome.added.is_empty() {
            debug!(
                "Port scan: {} removed, {} added",
                outcome.removed.len(),
                outcome.added.len()
            );
        }
    }
}

impl Bridge<Initializing> {
    pub fn create(
        backend: Box<dyn InputBackend>,
        ports: Box<dyn PortProvider>,
        filter: PortFilter,
        manager: SessionManager,
        scan_interval: Duration,
    ) -> Self {
        info!("Initializing bridge");
        Self::new(backend, ports, filter, manager, scan_interval, None)
    }

    /// Fill the port pool, open sessions for the controllers already present
    /// and transition to Running.
    pub fn start(mut self, now: Instant) -> Bridge<Running> {
        self.rescan(now);

        let devices = self.backend.enumerate();
        for device in devices {
            self.manager.connect_device(device);
        }
        if self.manager.is_empty() {
            warn!("No controllers opened; waiting for hotplug events");
        } else {
            info!("Bridging {} controller(s)", self.manager.len());
        }

        self.transition()
    }
}

impl Bridge<Running> {
    /// One pass of the scheduler.
    pub fn tick(&mut self, now: Instant) {
        while let Some(event) = self.backend.next_event() {
            self.manager.apply_event(event, self.backend.as_mut());
        }
        self.manager.settle_pending_zero();

        let scan_due = self
            .last_scan
            .map_or(true, |t| now.saturating_duration_since(t) > self.scan_interval);
        if scan_due {
            self.rescan(now);
        }
        self.manager.pair_waiting();

        self.manager
            .service(now, self.backend.as_mut(), self.ports.as_mut());
    }

    /// Apply a console command. Returns `false` when the loop should stop.
    pub fn handle_command(&mut self, command: BridgeCommand) -> bool {
        match command {
            BridgeCommand::ZeroSticks => self.manager.zero_sticks(),
            BridgeCommand::ToggleLayout(instance) => match self.manager.toggle_layout(instance) {
                Ok(_) => {}
                Err(ToggleRefused::UnknownController) => {
                    warn!("No controller with instance {}", instance)
                }
                Err(ToggleRefused::GlobalSwap) => {
                    warn!("Layout is swapped for every controller; per-controller toggle disabled")
                }
            },
            BridgeCommand::Status => log_status(&self.manager.status()),
            BridgeCommand::Quit => {
                info!("Quit requested");
                return false;
            }
        }
        true
    }

    /// Run until the token is cancelled or a quit command arrives, then shut
    /// every session down.
    pub fn run(mut self, token: CancellationToken, mut commands: mpsc::Receiver<BridgeCommand>) {
        info!("Bridge loop started");
        'running: while !token.is_cancelled() {
            while let Ok(command) = commands.try_recv() {
                if !self.handle_command(command) {
                    break 'running;
                }
            }
            self.tick(Instant::now());
            std::thread::sleep(TICK_SLEEP);
        }
        self.shutdown();
    }

    /// Silence haptics, close transports and release controller handles.
    pub fn shutdown(mut self) {
        info!("Shutting down bridge");
        self.manager.shutdown(self.backend.as_mut());
    }
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Unbound => "waiting for port",
        SessionState::Connecting => "connecting",
        SessionState::Connected => "connected",
        SessionState::Waiting => "waiting to reconnect",
        SessionState::Closed => "closed",
    }
}

fn status_line(session: &SessionStatus) -> String {
    let state = state_label(session.state);
    let link = match (session.port.as_deref(), session.port_state) {
        (Some(port), Some(PortState::Reserved { explicit: true, .. })) => {
            format!("{} on {} (mapped)", state, port)
        }
        (Some(port), _) => format!("{} on {}", state, port),
        (None, _) => state.to_string(),
    };
    let mut line = format!(
        "Controller {} (inst {}, {}): {} | layout {:?}",
        session.index, session.instance, session.name, link, session.layout
    );
    if session.rumbling {
        line.push_str(" | rumbling");
    }
    if session.rejected_frames > 0 {
        line.push_str(&format!(" | rejected frames {}", session.rejected_frames));
    }
    line
}

fn log_status(status: &[SessionStatus]) {
    if status.is_empty() {
        info!("No controller sessions");
        return;
    }
    for session in status {
        info!("{}", status_line(session));
    }
}
