//! gilrs-backed input subsystem
//!
//! Translates gilrs events into [`RawControllerEvent`]s and plays rumble through
//! gilrs force-feedback effects. gilrs reports sticks as -1.0..=1.0 with up
//! positive; the wire protocol wants up as the low end, so Y axes are inverted
//! here once and nowhere else.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Repeat, Replay, Ticks};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use tracing::{debug, error, info, warn};

use super::{DeviceInfo, Haptics, InputBackend, InstanceId, PadAxis, PadButton, RawControllerEvent};
use crate::error::{BridgeError, HapticError};

pub struct GilrsCollector {
    gilrs: Gilrs,

    // gilrs ids cannot be rebuilt from an integer, so keep the ones we have seen
    gamepads: HashMap<InstanceId, GamepadId>,

    // The effect currently playing per controller; replacing it stops the old one
    effects: HashMap<InstanceId, Effect>,

    // Some gilrs events expand into more than one raw event
    pending: VecDeque<RawControllerEvent>,
}

impl GilrsCollector {
    pub fn create() -> Result<Self, BridgeError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(BridgeError::Enumeration(e.to_string()));
            }
        };

        Ok(Self {
            gilrs,
            gamepads: HashMap::new(),
            effects: HashMap::new(),
            pending: VecDeque::new(),
        })
    }

    fn convert_gilrs_event(&mut self, id: GamepadId, event: EventType) {
        let instance = usize::from(id);
        match event {
            EventType::Connected => {
                let gamepad = self.gilrs.gamepad(id);
                let name = gamepad.name().to_string();
                let guid = guid_string(&gamepad.uuid());
                self.gamepads.insert(instance, id);
                info!("Controller connected: {} ({})", name, id);
                self.pending
                    .push_back(RawControllerEvent::Connected(DeviceInfo {
                        instance,
                        index: instance,
                        name,
                        guid,
                    }));
                self.queue_snapshot(id);
            }
            EventType::Disconnected => {
                warn!("Controller disconnected: {}", id);
                self.pending
                    .push_back(RawControllerEvent::Disconnected(instance));
            }
            EventType::ButtonPressed(button, _) | EventType::ButtonReleased(button, _) => {
                let pressed = matches!(event, EventType::ButtonPressed(..));
                if let Some(button) = map_button(button) {
                    self.pending.push_back(RawControllerEvent::Button {
                        instance,
                        button,
                        pressed,
                    });
                }
            }
            EventType::ButtonChanged(Button::LeftTrigger2, value, _) => {
                self.push_axis(instance, PadAxis::LeftTrigger, trigger_to_raw(value));
            }
            EventType::ButtonChanged(Button::RightTrigger2, value, _) => {
                self.push_axis(instance, PadAxis::RightTrigger, trigger_to_raw(value));
            }
            EventType::AxisChanged(axis, value, _) => match axis {
                Axis::LeftStickX => self.push_axis(instance, PadAxis::LeftX, stick_to_raw(value)),
                Axis::LeftStickY => self.push_axis(instance, PadAxis::LeftY, stick_to_raw(-value)),
                Axis::RightStickX => {
                    self.push_axis(instance, PadAxis::RightX, stick_to_raw(value))
                }
                Axis::RightStickY => {
                    self.push_axis(instance, PadAxis::RightY, stick_to_raw(-value))
                }
                Axis::LeftZ => self.push_axis(instance, PadAxis::LeftTrigger, trigger_to_raw(value)),
                Axis::RightZ => {
                    self.push_axis(instance, PadAxis::RightTrigger, trigger_to_raw(value))
                }
                Axis::DPadX => {
                    self.push_dpad(instance, PadButton::DPadLeft, PadButton::DPadRight, value)
                }
                // gilrs reports DPadY with up positive
                Axis::DPadY => {
                    self.push_dpad(instance, PadButton::DPadDown, PadButton::DPadUp, value)
                }
                _ => debug!("Ignoring unsupported axis: {:?}", axis),
            },
            _ => debug!("Unhandled event type: {:?}", event),
        }
    }

    /// Queue the current stick positions so a new session starts from the
    /// real state rather than from center.
    fn queue_snapshot(&mut self, id: GamepadId) {
        let instance = usize::from(id);
        let gamepad = self.gilrs.gamepad(id);
        let sticks = [
            (PadAxis::LeftX, stick_to_raw(gamepad.value(Axis::LeftStickX))),
            (PadAxis::LeftY, stick_to_raw(-gamepad.value(Axis::LeftStickY))),
            (PadAxis::RightX, stick_to_raw(gamepad.value(Axis::RightStickX))),
            (PadAxis::RightY, stick_to_raw(-gamepad.value(Axis::RightStickY))),
        ];
        for (axis, value) in sticks {
            self.push_axis(instance, axis, value);
        }
    }

    fn push_axis(&mut self, instance: InstanceId, axis: PadAxis, value: i16) {
        self.pending
            .push_back(RawControllerEvent::Axis { instance, axis, value });
    }

    fn push_dpad(&mut self, instance: InstanceId, negative: PadButton, positive: PadButton, value: f32) {
        for (button, pressed) in [(negative, value < -0.5), (positive, value > 0.5)] {
            self.pending.push_back(RawControllerEvent::Button {
                instance,
                button,
                pressed,
            });
        }
    }
}

impl Haptics for GilrsCollector {
    fn rumble(
        &mut self,
        instance: InstanceId,
        low: u16,
        high: u16,
        duration: Duration,
    ) -> Result<(), HapticError> {
        if low == 0 && high == 0 {
            if let Some(effect) = self.effects.remove(&instance) {
                effect.stop()?;
            }
            return Ok(());
        }

        let id = *self
            .gamepads
            .get(&instance)
            .ok_or(HapticError::UnknownDevice(instance))?;
        let supported = self
            .gilrs
            .connected_gamepad(id)
            .map(|gamepad| gamepad.is_ff_supported())
            .ok_or(HapticError::UnknownDevice(instance))?;
        if !supported {
            return Err(HapticError::Unsupported(instance));
        }

        let (scheduling, repeat) = burst_schedule(duration);
        let effect = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind: BaseEffectType::Strong { magnitude: low },
                scheduling,
                ..Default::default()
            })
            .add_effect(BaseEffect {
                kind: BaseEffectType::Weak { magnitude: high },
                scheduling,
                ..Default::default()
            })
            .repeat(repeat)
            .gamepads(&[id])
            .finish(&mut self.gilrs)?;
        effect.play()?;
        self.effects.insert(instance, effect);
        Ok(())
    }
}

/// Schedule for one rumble burst that ends on its own.
///
/// gilrs counts effect time in 50 ms ticks, so shorter bursts last one full
/// tick. Builders repeat forever unless told otherwise.
fn burst_schedule(duration: Duration) -> (Replay, Repeat) {
    let play_for = Ticks::from_ms(duration.as_millis().min(u128::from(u32::MAX)) as u32);
    let scheduling = Replay {
        play_for,
        ..Default::default()
    };
    (scheduling, Repeat::For(play_for))
}

impl InputBackend for GilrsCollector {
    fn enumerate(&mut self) -> Vec<DeviceInfo> {
        let gamepads: Vec<(GamepadId, String, [u8; 16])> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| (id, gamepad.name().to_string(), gamepad.uuid()))
            .collect();

        info!("Found {} gamepads", gamepads.len());
        let mut devices = Vec::with_capacity(gamepads.len());
        for (id, name, uuid) in gamepads {
            let instance = usize::from(id);
            self.gamepads.insert(instance, id);
            self.queue_snapshot(id);
            devices.push(DeviceInfo {
                instance,
                index: instance,
                name,
                guid: guid_string(&uuid),
            });
        }
        devices
    }

    fn next_event(&mut self) -> Option<RawControllerEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let Event { id, event, .. } = self.gilrs.next_event()?;
            debug!("Processing gilrs event: {:?} from {}", event, id);
            self.convert_gilrs_event(id, event);
        }
    }

    fn close(&mut self, instance: InstanceId) {
        if let Some(effect) = self.effects.remove(&instance) {
            if let Err(e) = effect.stop() {
                debug!("Failed to stop effect for controller {}: {}", instance, e);
            }
        }
        self.gamepads.remove(&instance);
    }
}

// Helper function to map gilrs Button to our PadButton
fn map_button(button: Button) -> Option<PadButton> {
    match button {
        Button::South => Some(PadButton::South),
        Button::East => Some(PadButton::East),
        Button::West => Some(PadButton::West),
        Button::North => Some(PadButton::North),
        Button::Start => Some(PadButton::Start),
        Button::Select => Some(PadButton::Back),
        Button::Mode => Some(PadButton::Guide),
        Button::C => Some(PadButton::Misc),
        Button::LeftTrigger => Some(PadButton::LeftShoulder),
        Button::RightTrigger => Some(PadButton::RightShoulder),
        Button::LeftThumb => Some(PadButton::LeftStick),
        Button::RightThumb => Some(PadButton::RightStick),
        Button::DPadUp => Some(PadButton::DPadUp),
        Button::DPadDown => Some(PadButton::DPadDown),
        Button::DPadLeft => Some(PadButton::DPadLeft),
        Button::DPadRight => Some(PadButton::DPadRight),
        // Analog triggers arrive as ButtonChanged values
        _ => None,
    }
}

fn stick_to_raw(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

fn trigger_to_raw(value: f32) -> i16 {
    (value.clamp(0.0, 1.0) * 32767.0).round() as i16
}

fn guid_string(uuid: &[u8; 16]) -> String {
    uuid.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stick_scaling() {
        assert_eq!(stick_to_raw(0.0), 0);
        assert_eq!(stick_to_raw(1.0), 32767);
        assert_eq!(stick_to_raw(-1.0), -32767);
        assert_eq!(stick_to_raw(2.0), 32767);
        assert_eq!(trigger_to_raw(-0.3), 0);
        assert_eq!(trigger_to_raw(1.0), 32767);
    }

    #[test]
    fn rumble_burst_is_bounded() {
        let (scheduling, repeat) = burst_schedule(Duration::from_millis(10));
        // Rounded up to a single tick
        assert!(scheduling.play_for == Ticks::from_ms(50));
        assert!(matches!(repeat, Repeat::For(max) if max == scheduling.play_for));

        let (scheduling, repeat) = burst_schedule(Duration::from_millis(120));
        assert!(scheduling.play_for == Ticks::from_ms(150));
        assert!(matches!(repeat, Repeat::For(max) if max == Ticks::from_ms(150)));
    }

    #[test]
    fn guid_is_lowercase_hex() {
        let mut uuid = [0u8; 16];
        uuid[0] = 0x03;
        uuid[15] = 0xAB;
        assert_eq!(guid_string(&uuid), "030000000000000000000000000000ab");
    }

    #[test]
    fn analog_triggers_are_not_buttons() {
        assert_eq!(map_button(Button::LeftTrigger2), None);
        assert_eq!(map_button(Button::LeftTrigger), Some(PadButton::LeftShoulder));
        assert_eq!(map_button(Button::Mode), Some(PadButton::Guide));
    }
}
