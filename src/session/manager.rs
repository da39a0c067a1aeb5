//! Owner of every controller session
//!
//! Binds sessions to ports through the [`PortRegistry`], drives reconnects,
//! routes input events and services each open link once per tick.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::session::{ControllerSession, SessionState};
use crate::controller::input_transform::{ButtonLayout, LayoutOverrides, TransformSettings};
use crate::controller::{DeviceInfo, Haptics, InputBackend, InstanceId, RawControllerEvent};
use crate::serial::port_registry::{PortRegistry, PortState, RescanOutcome};
use crate::serial::{PortInfo, PortProvider};

/// Runtime values the sessions are driven with.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub transform: TransformSettings,
    pub send_interval: Duration,
    pub reconnect_interval: Duration,
    pub baud: u32,
    pub zero_on_connect: bool,
    /// Lowercase substrings; when non-empty a controller name must contain one.
    pub name_filters: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            transform: TransformSettings::default(),
            send_interval: Duration::from_secs_f64(1.0 / 500.0),
            reconnect_interval: Duration::from_secs(1),
            baud: crate::protocol::DEFAULT_BAUD,
            zero_on_connect: false,
            name_filters: Vec::new(),
        }
    }
}

/// Snapshot of one session for the status command.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub instance: InstanceId,
    pub index: usize,
    pub name: String,
    pub guid: String,
    pub state: SessionState,
    pub port: Option<String>,
    /// How the registry holds the bound port.
    pub port_state: Option<PortState>,
    pub layout: ButtonLayout,
    pub rumbling: bool,
    pub rejected_frames: u64,
}

/// Why a live layout toggle was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleRefused {
    UnknownController,
    GlobalSwap,
}

pub struct SessionManager {
    settings: SessionSettings,
    registry: PortRegistry,
    overrides: LayoutOverrides,
    sessions: BTreeMap<InstanceId, ControllerSession>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, registry: PortRegistry, overrides: LayoutOverrides) -> Self {
        Self {
            settings,
            registry,
            overrides,
            sessions: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    pub fn session(&self, instance: InstanceId) -> Option<&ControllerSession> {
        self.sessions.get(&instance)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn name_allowed(&self, name: &str) -> bool {
        if self.settings.name_filters.is_empty() {
            return true;
        }
        let name = name.to_lowercase();
        self.settings
            .name_filters
            .iter()
            .any(|filter| name.contains(filter.as_str()))
    }

    /// Create a session for a newly connected controller.
    ///
    /// Returns `false` when the controller is skipped: filtered by name, a
    /// duplicate of an index that already has a session, or without a mapping
    /// while auto pairing is off.
    pub fn connect_device(&mut self, device: DeviceInfo) -> bool {
        if !self.name_allowed(&device.name) {
            info!(
                "Skipping controller {} ({}): name does not match the filter",
                device.index, device.name
            );
            return false;
        }
        if self.sessions.values().any(|s| s.device().index == device.index)
            || self.sessions.contains_key(&device.instance)
        {
            debug!("Ignoring duplicate connect for controller {}", device.index);
            return false;
        }
        if !self.registry.policy().auto_pairing && !self.registry.has_explicit(device.index) {
            info!(
                "Skipping controller {} ({}): no port mapped to it",
                device.index, device.name
            );
            return false;
        }

        self.overrides.promote_index(device.index, &device.guid);
        let layout = self.overrides.layout_for(&device.guid);
        let instance = device.instance;
        let mut session = ControllerSession::new(device, self.settings.transform, layout);

        if self.settings.zero_on_connect {
            session.request_zero();
        }

        match self.registry.assign(session.device().index) {
            Some(port) => session.bind(port),
            None => info!(
                "Controller {} (id {}, inst {}) connected; waiting for an available port",
                session.device().index,
                session.device().guid,
                instance
            ),
        }

        self.sessions.insert(instance, session);
        true
    }

    /// Tear down the session of a controller that went away.
    pub fn disconnect_device<B: InputBackend + ?Sized>(&mut self, instance: InstanceId, backend: &mut B) {
        let Some(mut session) = self.sessions.remove(&instance) else {
            return;
        };
        warn!(
            "Controller {} (id {}) removed",
            instance,
            session.device().guid
        );
        session.close(backend);
        self.registry.release(session.device().index);
        backend.close(instance);
    }

    /// Route one input event.
    pub fn apply_event<B: InputBackend + ?Sized>(&mut self, event: RawControllerEvent, backend: &mut B) {
        match event {
            RawControllerEvent::Connected(device) => {
                self.connect_device(device);
            }
            RawControllerEvent::Disconnected(instance) => self.disconnect_device(instance, backend),
            RawControllerEvent::Button {
                instance,
                button,
                pressed,
            } => {
                if let Some(session) = self.sessions.get_mut(&instance) {
                    session.apply_button(button, pressed);
                }
            }
            RawControllerEvent::Axis {
                instance,
                axis,
                value,
            } => {
                if let Some(session) = self.sessions.get_mut(&instance) {
                    session.apply_axis(axis, value);
                }
            }
        }
    }

    /// Try to hand a port to every session that has none.
    pub fn pair_waiting(&mut self) {
        for session in self.sessions.values_mut() {
            if session.port().is_some() {
                continue;
            }
            if let Some(port) = self.registry.assign(session.device().index) {
                session.bind(port);
            }
        }
    }

    /// Ports sessions currently point at.
    pub fn bound_ports(&self) -> HashSet<String> {
        self.sessions
            .values()
            .filter_map(|s| s.port().map(str::to_string))
            .collect()
    }

    /// Reconcile the registry with a discovery result and unbind sessions
    /// whose port vanished.
    pub fn rescan<H: Haptics + ?Sized>(
        &mut self,
        discovered: &[PortInfo],
        haptics: &mut H,
        now: Instant,
    ) -> RescanOutcome {
        let outcome = self.registry.rescan(discovered, &self.bound_ports());
        self.handle_removed_ports(&outcome.removed, haptics, now);
        outcome
    }

    pub fn handle_removed_ports<H: Haptics + ?Sized>(
        &mut self,
        removed: &[String],
        haptics: &mut H,
        now: Instant,
    ) {
        for session in self.sessions.values_mut() {
            let Some(port) = session.port() else {
                continue;
            };
            if !removed.iter().any(|r| r == port) {
                continue;
            }
            if let Some(port) = session.unbind(haptics, now) {
                warn!(
                    "{} removed; controller {} waiting for reassignment",
                    port,
                    session.device().index
                );
            }
        }
    }

    /// Reopen links whose backoff elapsed, then send and receive on every
    /// connected session.
    pub fn service<H, P>(&mut self, now: Instant, haptics: &mut H, ports: &mut P)
    where
        H: Haptics + ?Sized,
        P: PortProvider + ?Sized, {
        let reconnect_interval = self.settings.reconnect_interval;
        let send_interval = self.settings.send_interval;
        let baud = self.settings.baud;

        for session in self.sessions.values_mut() {
            if session.reconnect_due(now, reconnect_interval) {
                session.mark_reconnect_attempt(now);
                let Some(path) = session.port().map(str::to_string) else {
                    continue;
                };
                match ports.open(&path, baud) {
                    Ok(transport) => session.attach(transport, now),
                    Err(e) => session.open_failed(&e, now),
                }
            }

            if let Err(e) = session.service(haptics, now, send_interval) {
                let port = session.port().unwrap_or("?");
                if e.is_disconnect() {
                    warn!("{} disconnected from controller {}", port, session.device().index);
                } else {
                    warn!("Link error on {} for controller {}: {}", port, session.device().index, e);
                }
                session.drop_link(haptics, now);
            }
        }
    }

    /// Apply zero-on-connect for sessions created since the last call.
    pub fn settle_pending_zero(&mut self) {
        for session in self.sessions.values_mut() {
            if let Some(offsets) = session.settle_zero() {
                info!(
                    "Zeroed sticks for controller {} on connect (offsets {:?})",
                    session.device().index,
                    offsets
                );
            }
        }
    }

    /// Re-zero every session's sticks from their latest raw samples.
    pub fn zero_sticks(&mut self) {
        for session in self.sessions.values_mut() {
            let offsets = session.zero_sticks();
            info!(
                "Zeroed sticks for controller {} (offsets {:?})",
                session.device().index,
                offsets
            );
        }
    }

    /// Flip one controller's button layout.
    pub fn toggle_layout(&mut self, instance: InstanceId) -> Result<ButtonLayout, ToggleRefused> {
        let session = self
            .sessions
            .get_mut(&instance)
            .ok_or(ToggleRefused::UnknownController)?;
        let layout = self
            .overrides
            .toggle(&session.device().guid)
            .ok_or(ToggleRefused::GlobalSwap)?;
        session.set_layout(layout);
        info!("Controller {} now uses the {:?} layout", instance, layout);
        Ok(layout)
    }

    pub fn status(&self) -> Vec<SessionStatus> {
        self.sessions
            .values()
            .map(|s| SessionStatus {
                instance: s.instance(),
                index: s.device().index,
                name: s.device().name.clone(),
                guid: s.device().guid.clone(),
                state: s.state(),
                port: s.port().map(str::to_string),
                port_state: s.port().map(|p| self.registry.state(p)),
                layout: s.layout(),
                rumbling: s.rumble().is_active(),
                rejected_frames: s.rejected_frames(),
            })
            .collect()
    }

    /// Silence, close and forget every session.
    pub fn shutdown<B: InputBackend + ?Sized>(&mut self, backend: &mut B) {
        let sessions = std::mem::take(&mut self.sessions);
        for (instance, mut session) in sessions {
            session.close(backend);
            backend.close(instance);
            debug!("Session {} closed", instance);
        }
    }
}
