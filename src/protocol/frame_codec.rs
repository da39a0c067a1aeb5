//! Telemetry frame decoding
//!
//! The serial link delivers an unframed byte stream, so a read may hand over half
//! a frame, several frames or line noise. Decoding works on a growing buffer:
//! find the first header byte, validate the 11 bytes that follow it and either
//! consume the whole frame or only that header byte. Dropping a single byte per
//! failed candidate guarantees progress through arbitrary noise and never skips
//! over a valid frame that starts inside a corrupt one.

use tracing::trace;

use super::{TELEMETRY_FRAME_LEN, TELEMETRY_HEADER, TELEMETRY_PAYLOAD_LEN, TELEMETRY_TYPE_RUMBLE};

/// The opaque 8-byte body of a telemetry frame.
pub type TelemetryPayload = [u8; TELEMETRY_PAYLOAD_LEN];

/// Sum of all bytes, truncated to 8 bits.
#[inline]
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Build a complete telemetry frame around `payload`.
pub fn encode_telemetry(payload: &TelemetryPayload) -> [u8; TELEMETRY_FRAME_LEN] {
    let mut frame = [0u8; TELEMETRY_FRAME_LEN];
    frame[0] = TELEMETRY_HEADER;
    frame[1] = TELEMETRY_TYPE_RUMBLE;
    frame[2..10].copy_from_slice(payload);
    frame[10] = checksum(&frame[..10]);
    frame
}

/// Extract the next valid payload from `buffer`, consuming what was examined.
///
/// Returns `None` when no complete valid frame is buffered yet. Bytes that can
/// never be part of a frame are discarded; a partial frame starting at a header
/// byte is kept for the next call.
pub fn decode_next(buffer: &mut Vec<u8>) -> Option<TelemetryPayload> {
    let mut rejected = 0;
    decode_counting(buffer, &mut rejected)
}

fn decode_counting(buffer: &mut Vec<u8>, rejected: &mut u64) -> Option<TelemetryPayload> {
    loop {
        let Some(start) = buffer.iter().position(|&b| b == TELEMETRY_HEADER) else {
            buffer.clear();
            return None;
        };

        if buffer.len() - start < TELEMETRY_FRAME_LEN {
            buffer.drain(..start);
            return None;
        }

        let frame = &buffer[start..start + TELEMETRY_FRAME_LEN];
        if frame[1] == TELEMETRY_TYPE_RUMBLE && checksum(&frame[..10]) == frame[10] {
            let mut payload = [0u8; TELEMETRY_PAYLOAD_LEN];
            payload.copy_from_slice(&frame[2..10]);
            buffer.drain(..start + TELEMETRY_FRAME_LEN);
            return Some(payload);
        }

        trace!(
            "Rejected telemetry candidate {:02x?} (type {:#04x})",
            frame,
            frame[1]
        );
        *rejected += 1;
        buffer.drain(..=start);
    }
}

/// Per-transport decoding state: the pending byte buffer plus a rejection counter.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    rejected: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Decode the next payload, if a full valid frame is buffered.
    pub fn next_payload(&mut self) -> Option<TelemetryPayload> {
        decode_counting(&mut self.buffer, &mut self.rejected)
    }

    /// Decode every buffered frame and keep only the newest payload.
    pub fn latest_payload(&mut self) -> Option<TelemetryPayload> {
        let mut latest = None;
        while let Some(payload) = self.next_payload() {
            latest = Some(payload);
        }
        latest
    }

    /// Number of candidate frames rejected so far.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
