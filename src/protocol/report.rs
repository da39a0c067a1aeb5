use bitflags::bitflags;

use super::{REPORT_HEADER, REPORT_LEN};

bitflags! {
    /// Button masks understood by the peripheral firmware.
    ///
    /// Bits 14 and 15 are unused on the wire and always sent as zero.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u16 {
        const Y = 1 << 0;
        const B = 1 << 1;
        const A = 1 << 2;
        const X = 1 << 3;
        const L = 1 << 4;
        const R = 1 << 5;
        const ZL = 1 << 6;
        const ZR = 1 << 7;
        const MINUS = 1 << 8;
        const PLUS = 1 << 9;
        const LCLICK = 1 << 10;
        const RCLICK = 1 << 11;
        const HOME = 1 << 12;
        const CAPTURE = 1 << 13;
    }
}

/// Directional pad value, clockwise from up with a dedicated center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Hat {
    Top = 0x00,
    TopRight = 0x01,
    Right = 0x02,
    BottomRight = 0x03,
    Bottom = 0x04,
    BottomLeft = 0x05,
    Left = 0x06,
    TopLeft = 0x07,
    #[default]
    Center = 0x08,
}

impl TryFrom<u8> for Hat {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Hat::Top,
            0x01 => Hat::TopRight,
            0x02 => Hat::Right,
            0x03 => Hat::BottomRight,
            0x04 => Hat::Bottom,
            0x05 => Hat::BottomLeft,
            0x06 => Hat::Left,
            0x07 => Hat::TopLeft,
            0x08 => Hat::Center,
            other => return Err(other),
        })
    }
}

/// Stick value the firmware treats as centered.
pub const STICK_CENTER: u8 = 128;

/// Complete controller state as sent to the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerReport {
    pub buttons: Buttons,
    pub hat: Hat,
    pub lx: u8,
    pub ly: u8,
    pub rx: u8,
    pub ry: u8,
}

impl Default for ControllerReport {
    fn default() -> Self {
        Self {
            buttons: Buttons::empty(),
            hat: Hat::Center,
            lx: STICK_CENTER,
            ly: STICK_CENTER,
            rx: STICK_CENTER,
            ry: STICK_CENTER,
        }
    }
}

impl ControllerReport {
    pub fn set_button(&mut self, button: Buttons, pressed: bool) {
        self.buttons.set(button, pressed);
    }
}

/// Serialize a report into the 8-byte host frame.
pub fn encode_report(report: &ControllerReport) -> [u8; REPORT_LEN] {
    let [lo, hi] = report.buttons.bits().to_le_bytes();
    [
        REPORT_HEADER,
        lo,
        hi,
        report.hat as u8,
        report.lx,
        report.ly,
        report.rx,
        report.ry,
    ]
}

/// Parse a host frame back into a report.
///
/// Returns `None` for a wrong header, an out-of-range hat value or button bits
/// outside the known set.
pub fn decode_report(bytes: &[u8]) -> Option<ControllerReport> {
    if bytes.len() != REPORT_LEN || bytes[0] != REPORT_HEADER {
        return None;
    }
    let buttons = Buttons::from_bits(u16::from_le_bytes([bytes[1], bytes[2]]))?;
    let hat = Hat::try_from(bytes[3]).ok()?;
    Some(ControllerReport {
        buttons,
        hat,
        lx: bytes[4],
        ly: bytes[5],
        rx: bytes[6],
        ry: bytes[7],
    })
}
