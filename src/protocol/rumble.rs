use super::frame_codec::TelemetryPayload;

/// Payload the firmware emits while the console requests no vibration.
pub const NEUTRAL_PAYLOAD: TelemetryPayload = [0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40];

/// Raw amplitudes below this on both channels are treated as silence.
const RAW_NOISE_FLOOR: u16 = 8;

const RAW_MAX: f32 = 1023.0;

/// Normalized amplitudes (0.0 - 1.0) for the two haptic channels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RumbleSample {
    pub left: f32,
    pub right: f32,
}

impl RumbleSample {
    pub const SILENT: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    /// Strongest of the two channels.
    pub fn energy(&self) -> f32 {
        self.left.max(self.right)
    }

    /// Interpret a telemetry payload.
    ///
    /// Each channel is a 10-bit amplitude: the right channel lives in bytes 0-1,
    /// the left channel in bytes 4-5 (low byte first, top two bits in the
    /// second byte).
    pub fn from_payload(payload: &TelemetryPayload) -> Self {
        if *payload == NEUTRAL_PAYLOAD {
            return Self::SILENT;
        }
        let right_raw = (u16::from(payload[1] & 0x03) << 8) | u16::from(payload[0]);
        let left_raw = (u16::from(payload[5] & 0x03) << 8) | u16::from(payload[4]);
        if left_raw < RAW_NOISE_FLOOR && right_raw < RAW_NOISE_FLOOR {
            return Self::SILENT;
        }
        Self {
            left: (f32::from(left_raw) / RAW_MAX).clamp(0.0, 1.0),
            right: (f32::from(right_raw) / RAW_MAX).clamp(0.0, 1.0),
        }
    }
}
