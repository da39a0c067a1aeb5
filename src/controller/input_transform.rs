//! Conversion of raw controller samples into report fields
//!
//! Sticks go through calibration and deadzone before being rescaled to the
//! 0-255 wire range. Triggers become digital ZL/ZR presses once they cross a
//! threshold, and only on the crossing. Face buttons follow the session's
//! [`ButtonLayout`]; the D-pad flags are folded into one [`Hat`] value.

use std::collections::HashSet;

use super::{PadAxis, PadButton};
use crate::protocol::report::STICK_CENTER;
use crate::protocol::{Buttons, ControllerReport, Hat};

/// Map a signed axis value to the 0-255 stick range.
///
/// Magnitudes below `deadzone` snap to the exact center.
pub fn axis_to_stick(value: i16, deadzone: i32) -> u8 {
    let value = i32::from(value);
    if value.abs() < deadzone {
        return STICK_CENTER;
    }
    let scaled = (f64::from(value + 32768) * 255.0 / 65535.0).round();
    scaled.clamp(0.0, 255.0) as u8
}

/// Subtract a captured center sample, saturating at the i16 range.
pub fn calibrate(value: i16, offset: i16) -> i16 {
    (i32::from(value) - i32::from(offset)).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Digital interpretation of an analog trigger.
pub fn trigger_pressed(value: i16, threshold: i16) -> bool {
    value >= threshold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DpadDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Independent D-pad flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dpad {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl Dpad {
    pub fn set(&mut self, direction: DpadDirection, pressed: bool) {
        match direction {
            DpadDirection::Up => self.up = pressed,
            DpadDirection::Down => self.down = pressed,
            DpadDirection::Left => self.left = pressed,
            DpadDirection::Right => self.right = pressed,
        }
    }

    /// Fold the flags into a hat value. Opposite directions cancel each other
    /// on their axis, so up+down+right reads as right.
    pub fn hat(&self) -> Hat {
        let vertical = match (self.up, self.down) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        };
        let horizontal = match (self.left, self.right) {
            (true, false) => -1,
            (false, true) => 1,
            _ => 0,
        };
        match (vertical, horizontal) {
            (-1, 1) => Hat::TopRight,
            (-1, -1) => Hat::TopLeft,
            (1, 1) => Hat::BottomRight,
            (1, -1) => Hat::BottomLeft,
            (-1, _) => Hat::Top,
            (1, _) => Hat::Bottom,
            (_, 1) => Hat::Right,
            (_, -1) => Hat::Left,
            _ => Hat::Center,
        }
    }
}

/// What a controller button drives in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedInput {
    Button(Buttons),
    Dpad(DpadDirection),
}

/// Face-button table. `Swapped` exchanges A/B and X/Y for controllers whose
/// labels are reported in the opposite convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonLayout {
    #[default]
    Standard,
    Swapped,
}

impl ButtonLayout {
    pub fn map(self, button: PadButton) -> MappedInput {
        let swapped = self == ButtonLayout::Swapped;
        let bit = match button {
            PadButton::South if swapped => Buttons::B,
            PadButton::South => Buttons::A,
            PadButton::East if swapped => Buttons::A,
            PadButton::East => Buttons::B,
            PadButton::West if swapped => Buttons::Y,
            PadButton::West => Buttons::X,
            PadButton::North if swapped => Buttons::X,
            PadButton::North => Buttons::Y,
            PadButton::LeftShoulder => Buttons::L,
            PadButton::RightShoulder => Buttons::R,
            PadButton::Back => Buttons::MINUS,
            PadButton::Start => Buttons::PLUS,
            PadButton::Guide => Buttons::HOME,
            PadButton::Misc => Buttons::CAPTURE,
            PadButton::LeftStick => Buttons::LCLICK,
            PadButton::RightStick => Buttons::RCLICK,
            PadButton::DPadUp => return MappedInput::Dpad(DpadDirection::Up),
            PadButton::DPadDown => return MappedInput::Dpad(DpadDirection::Down),
            PadButton::DPadLeft => return MappedInput::Dpad(DpadDirection::Left),
            PadButton::DPadRight => return MappedInput::Dpad(DpadDirection::Right),
        };
        MappedInput::Button(bit)
    }
}

/// Which controllers run the swapped layout.
///
/// Index overrides are promoted to GUIDs when the device first shows up, so a
/// toggle follows the physical controller rather than its enumeration slot.
#[derive(Debug, Clone, Default)]
pub struct LayoutOverrides {
    pub swap_all: bool,
    pub swap_guids: HashSet<String>,
    pub swap_indices: HashSet<usize>,
}

impl LayoutOverrides {
    pub fn promote_index(&mut self, index: usize, guid: &str) {
        if self.swap_indices.contains(&index) {
            self.swap_guids.insert(guid.to_lowercase());
        }
    }

    pub fn layout_for(&self, guid: &str) -> ButtonLayout {
        if self.swap_all || self.swap_guids.contains(&guid.to_lowercase()) {
            ButtonLayout::Swapped
        } else {
            ButtonLayout::Standard
        }
    }

    /// Flip one controller's layout. Returns `None` while the global swap is on.
    pub fn toggle(&mut self, guid: &str) -> Option<ButtonLayout> {
        if self.swap_all {
            return None;
        }
        let guid = guid.to_lowercase();
        if !self.swap_guids.remove(&guid) {
            self.swap_guids.insert(guid.clone());
        }
        Some(self.layout_for(&guid))
    }
}

/// Raw thresholds used by [`InputTransform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformSettings {
    /// Stick magnitude below which the stick reads centered.
    pub deadzone: i32,
    /// Trigger value at which ZL/ZR count as pressed.
    pub trigger_threshold: i16,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            deadzone: (0.08 * 32767.0) as i32,
            trigger_threshold: (0.35 * 32767.0) as i16,
        }
    }
}

const STICKS: usize = 4;

fn stick_slot(axis: PadAxis) -> Option<usize> {
    match axis {
        PadAxis::LeftX => Some(0),
        PadAxis::LeftY => Some(1),
        PadAxis::RightX => Some(2),
        PadAxis::RightY => Some(3),
        PadAxis::LeftTrigger | PadAxis::RightTrigger => None,
    }
}

fn stick_field(report: &mut ControllerReport, slot: usize) -> &mut u8 {
    match slot {
        0 => &mut report.lx,
        1 => &mut report.ly,
        2 => &mut report.rx,
        _ => &mut report.ry,
    }
}

/// Per-session input state: held buttons, trigger edges, D-pad flags, the last
/// raw stick samples and optional calibration offsets.
#[derive(Debug, Clone)]
pub struct InputTransform {
    settings: TransformSettings,
    layout: ButtonLayout,
    held: HashSet<PadButton>,
    dpad: Dpad,
    triggers: [bool; 2],
    raw_sticks: [i16; STICKS],
    offsets: Option<[i16; STICKS]>,
}

impl InputTransform {
    pub fn new(settings: TransformSettings, layout: ButtonLayout) -> Self {
        Self {
            settings,
            layout,
            held: HashSet::new(),
            dpad: Dpad::default(),
            triggers: [false; 2],
            raw_sticks: [0; STICKS],
            offsets: None,
        }
    }

    pub fn layout(&self) -> ButtonLayout {
        self.layout
    }

    /// Apply a button transition. Repeats of the current state are ignored.
    ///
    /// Returns `true` when the report changed.
    pub fn apply_button(
        &mut self,
        button: PadButton,
        pressed: bool,
        report: &mut ControllerReport,
    ) -> bool {
        let changed = if pressed {
            self.held.insert(button)
        } else {
            self.held.remove(&button)
        };
        if !changed {
            return false;
        }
        match self.layout.map(button) {
            MappedInput::Button(bit) => report.set_button(bit, pressed),
            MappedInput::Dpad(direction) => {
                self.dpad.set(direction, pressed);
                report.hat = self.dpad.hat();
            }
        }
        true
    }

    /// Apply an analog sample. Sticks always update; triggers only on a
    /// threshold crossing.
    pub fn apply_axis(&mut self, axis: PadAxis, value: i16, report: &mut ControllerReport) -> bool {
        if let Some(slot) = stick_slot(axis) {
            self.raw_sticks[slot] = value;
            *stick_field(report, slot) = self.stick_value(slot);
            return true;
        }

        let (slot, bit) = match axis {
            PadAxis::LeftTrigger => (0, Buttons::ZL),
            _ => (1, Buttons::ZR),
        };
        let pressed = trigger_pressed(value, self.settings.trigger_threshold);
        if pressed == self.triggers[slot] {
            return false;
        }
        self.triggers[slot] = pressed;
        report.set_button(bit, pressed);
        true
    }

    /// Switch the face-button table and rebuild the button bits from what is
    /// currently held, so nothing stays latched under the old table.
    pub fn set_layout(&mut self, layout: ButtonLayout, report: &mut ControllerReport) {
        self.layout = layout;
        let mut buttons = Buttons::empty();
        for button in &self.held {
            if let MappedInput::Button(bit) = layout.map(*button) {
                buttons |= bit;
            }
        }
        buttons.set(Buttons::ZL, self.triggers[0]);
        buttons.set(Buttons::ZR, self.triggers[1]);
        report.buttons = buttons;
    }

    /// Treat the current stick positions as the new centers.
    pub fn zero_sticks(&mut self, report: &mut ControllerReport) -> [i16; STICKS] {
        self.offsets = Some(self.raw_sticks);
        for slot in 0..STICKS {
            *stick_field(report, slot) = self.stick_value(slot);
        }
        self.raw_sticks
    }

    fn stick_value(&self, slot: usize) -> u8 {
        let raw = self.raw_sticks[slot];
        let value = match self.offsets {
            Some(offsets) => calibrate(raw, offsets[slot]),
            None => raw,
        };
        axis_to_stick(value, self.settings.deadzone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform(layout: ButtonLayout) -> InputTransform {
        InputTransform::new(
            TransformSettings {
                deadzone: 8000,
                trigger_threshold: 11468,
            },
            layout,
        )
    }

    #[test]
    fn deadzone_boundary() {
        assert_eq!(axis_to_stick(7999, 8000), 128);
        assert_eq!(axis_to_stick(-7999, 8000), 128);
        assert_eq!(axis_to_stick(0, 8000), 128);
        assert_eq!(axis_to_stick(8000, 8000), 159);
        assert_eq!(axis_to_stick(-8000, 8000), 96);
        assert_eq!(axis_to_stick(-32768, 8000), 0);
        assert_eq!(axis_to_stick(32767, 8000), 255);
    }

    #[test]
    fn zero_deadzone_still_centers() {
        assert_eq!(axis_to_stick(0, 0), 128);
        assert_eq!(axis_to_stick(i16::MIN, 0), 0);
    }

    #[test]
    fn calibration_saturates() {
        assert_eq!(calibrate(1000, 300), 700);
        assert_eq!(calibrate(-32768, 500), -32768);
        assert_eq!(calibrate(32767, -500), 32767);
    }

    #[test]
    fn dpad_diagonals_and_opposites() {
        let cases = [
            (Dpad { up: true, ..Default::default() }, Hat::Top),
            (Dpad { up: true, right: true, ..Default::default() }, Hat::TopRight),
            (Dpad { down: true, left: true, ..Default::default() }, Hat::BottomLeft),
            (Dpad { up: true, down: true, ..Default::default() }, Hat::Center),
            (Dpad { up: true, down: true, right: true, left: false }, Hat::Right),
            (Dpad { up: true, down: true, left: true, right: true }, Hat::Center),
            (Dpad::default(), Hat::Center),
        ];
        for (dpad, hat) in cases {
            assert_eq!(dpad.hat(), hat, "{dpad:?}");
        }
    }

    #[test]
    fn repeated_button_state_is_ignored() {
        let mut t = transform(ButtonLayout::Standard);
        let mut report = ControllerReport::default();
        assert!(t.apply_button(PadButton::South, true, &mut report));
        assert!(!t.apply_button(PadButton::South, true, &mut report));
        assert_eq!(report.buttons, Buttons::A);
        assert!(t.apply_button(PadButton::South, false, &mut report));
        assert!(report.buttons.is_empty());
    }

    #[test]
    fn swapped_layout_exchanges_face_buttons() {
        let mut t = transform(ButtonLayout::Swapped);
        let mut report = ControllerReport::default();
        t.apply_button(PadButton::South, true, &mut report);
        t.apply_button(PadButton::West, true, &mut report);
        assert_eq!(report.buttons, Buttons::B | Buttons::Y);
    }

    #[test]
    fn layout_change_does_not_latch_held_buttons() {
        let mut t = transform(ButtonLayout::Standard);
        let mut report = ControllerReport::default();
        t.apply_button(PadButton::South, true, &mut report);
        t.set_layout(ButtonLayout::Swapped, &mut report);
        assert_eq!(report.buttons, Buttons::B);
        t.apply_button(PadButton::South, false, &mut report);
        assert!(report.buttons.is_empty());
    }

    #[test]
    fn trigger_is_edge_triggered() {
        let mut t = transform(ButtonLayout::Standard);
        let mut report = ControllerReport::default();
        assert!(!t.apply_axis(PadAxis::LeftTrigger, 11467, &mut report));
        assert!(t.apply_axis(PadAxis::LeftTrigger, 11468, &mut report));
        assert!(!t.apply_axis(PadAxis::LeftTrigger, 32767, &mut report));
        assert_eq!(report.buttons, Buttons::ZL);
        assert!(t.apply_axis(PadAxis::LeftTrigger, 0, &mut report));
        assert!(report.buttons.is_empty());
    }

    #[test]
    fn dpad_buttons_drive_the_hat() {
        let mut t = transform(ButtonLayout::Standard);
        let mut report = ControllerReport::default();
        t.apply_button(PadButton::DPadUp, true, &mut report);
        t.apply_button(PadButton::DPadLeft, true, &mut report);
        assert_eq!(report.hat, Hat::TopLeft);
        t.apply_button(PadButton::DPadUp, false, &mut report);
        assert_eq!(report.hat, Hat::Left);
        assert!(report.buttons.is_empty());
    }

    #[test]
    fn zero_sticks_recenters_drift() {
        let mut t = transform(ButtonLayout::Standard);
        let mut report = ControllerReport::default();
        t.apply_axis(PadAxis::LeftX, 12000, &mut report);
        assert_ne!(report.lx, 128);
        let offsets = t.zero_sticks(&mut report);
        assert_eq!(offsets, [12000, 0, 0, 0]);
        assert_eq!(report.lx, 128);
        t.apply_axis(PadAxis::LeftX, 12000 + 9000, &mut report);
        assert_eq!(report.lx, axis_to_stick(9000, 8000));
    }

    #[test]
    fn overrides_promote_and_toggle() {
        let mut overrides = LayoutOverrides::default();
        overrides.swap_indices.insert(2);
        overrides.promote_index(2, "ABCD");
        overrides.promote_index(3, "ffff");
        assert_eq!(overrides.layout_for("abcd"), ButtonLayout::Swapped);
        assert_eq!(overrides.layout_for("ffff"), ButtonLayout::Standard);

        assert_eq!(overrides.toggle("abcd"), Some(ButtonLayout::Standard));
        assert_eq!(overrides.toggle("abcd"), Some(ButtonLayout::Swapped));

        overrides.swap_all = true;
        assert_eq!(overrides.toggle("ffff"), None);
        assert_eq!(overrides.layout_for("ffff"), ButtonLayout::Swapped);
    }
}
