//! Controller subsystem for gamepad input handling
//!
//! Implements the input side of the bridge:
//!
//! 1. [`event_collector`] - Raw gamepad input collection and rumble playback (gilrs)
//! 2. [`input_transform`] - Conversion of raw samples into report fields
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Collector ──► RawControllerEvent ──► InputTransform ──► ControllerReport
//!                ▲
//!                └──────────── rumble commands ◄── RumbleState
//! ```
//!
//! The rest of the bridge only sees the [`InputBackend`] and [`Haptics`] traits,
//! so the scheduler can be driven by a scripted backend in tests.

pub mod event_collector;
pub mod input_transform;

use std::time::Duration;

use crate::error::HapticError;

/// Transient per-connection id handed out by the input subsystem.
pub type InstanceId = usize;

/// Static description of a connected controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub instance: InstanceId,
    /// Enumeration index, the key used by explicit port mappings.
    pub index: usize,
    pub name: String,
    /// Stable identifier that survives reconnects (lowercase hex GUID).
    pub guid: String,
}

/// Controller buttons in positional (Xbox-style) naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadButton {
    South,
    East,
    West,
    North,
    LeftShoulder,
    RightShoulder,
    Back,
    Start,
    Guide,
    Misc,
    LeftStick,
    RightStick,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

/// Analog inputs. Stick values are signed 16-bit with up/left negative;
/// triggers run from 0 to 32767.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadAxis {
    LeftX,
    LeftY,
    RightX,
    RightY,
    LeftTrigger,
    RightTrigger,
}

/// Events delivered by the input subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum RawControllerEvent {
    Connected(DeviceInfo),
    Disconnected(InstanceId),
    Button {
        instance: InstanceId,
        button: PadButton,
        pressed: bool,
    },
    Axis {
        instance: InstanceId,
        axis: PadAxis,
        value: i16,
    },
}

/// Rumble actuation on the input devices.
pub trait Haptics {
    /// Play two channel intensities (0 - 65535) for `duration`.
    fn rumble(
        &mut self,
        instance: InstanceId,
        low: u16,
        high: u16,
        duration: Duration,
    ) -> Result<(), HapticError>;

    /// Force haptic output to zero.
    fn stop_rumble(&mut self, instance: InstanceId) -> Result<(), HapticError> {
        self.rumble(instance, 0, 0, Duration::ZERO)
    }
}

/// Capability set the bridge consumes from the host input subsystem.
pub trait InputBackend: Haptics {
    /// Devices that are connected right now.
    fn enumerate(&mut self) -> Vec<DeviceInfo>;

    /// Next pending event, without blocking.
    fn next_event(&mut self) -> Option<RawControllerEvent>;

    /// Release everything held for a device.
    fn close(&mut self, instance: InstanceId);
}
