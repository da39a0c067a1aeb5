//! Wire protocol spoken with the peripheral over the serial link
//!
//! Two fixed-size frame types cross the wire:
//!
//! ```text
//! Host -> Peripheral : 0xAA, buttons (LE16), hat, lx, ly, rx, ry      (8 bytes)
//! Peripheral -> Host : 0xBB, 0x01, 8 payload bytes, checksum         (11 bytes)
//! ```
//!
//! 1. [`report`] - Controller state and its 8-byte host frame
//! 2. [`frame_codec`] - Telemetry decoding with single-byte resynchronisation
//! 3. [`rumble`] - Interpretation of the telemetry payload as haptic amplitudes

pub mod frame_codec;
pub mod report;
pub mod rumble;

pub use frame_codec::{decode_next, encode_telemetry, FrameDecoder, TelemetryPayload};
pub use report::{decode_report, encode_report, Buttons, ControllerReport, Hat};
pub use rumble::RumbleSample;

/// First byte of every host -> peripheral report.
pub const REPORT_HEADER: u8 = 0xAA;

/// Length of a host -> peripheral report.
pub const REPORT_LEN: usize = 8;

/// First byte of every peripheral -> host telemetry frame.
pub const TELEMETRY_HEADER: u8 = 0xBB;

/// The only telemetry type the peripheral emits today.
pub const TELEMETRY_TYPE_RUMBLE: u8 = 0x01;

/// Header + type + payload + checksum.
pub const TELEMETRY_FRAME_LEN: usize = 11;

/// Opaque payload carried by a telemetry frame.
pub const TELEMETRY_PAYLOAD_LEN: usize = 8;

/// Baud rate the firmware is built with.
pub const DEFAULT_BAUD: u32 = 921_600;
