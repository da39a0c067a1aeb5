//! Haptic feedback decisions for one session
//!
//! The peripheral streams rumble telemetry while the console wants vibration
//! and simply stops sending when it does not, so silence has to be inferred:
//! an active rumble is cut when samples stop arriving, and also when the same
//! energy has been repeated for too long.

use std::time::{Duration, Instant};

use crate::protocol::RumbleSample;

/// Below this energy a sample counts as silence.
pub const MIN_ACTIVE: f32 = 0.50;

/// Attenuation applied to both channels before playback.
pub const RUMBLE_SCALE: f32 = 0.8;

/// Active rumble stops after this long without a sample.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(250);

/// Active rumble stops after this long without an energy change.
pub const STUCK_TIMEOUT: Duration = Duration::from_millis(600);

/// Length of every haptic command; samples keep re-triggering it.
pub const HAPTIC_DURATION: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RumblePhase {
    Idle,
    Active { energy: f32 },
}

/// What to do with the controller's motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticCommand {
    Play { low: u16, high: u16 },
    Stop,
}

#[derive(Debug, Clone)]
pub struct RumbleState {
    phase: RumblePhase,
    last_energy: f32,
    last_sample: Option<Instant>,
    last_change: Option<Instant>,
}

impl Default for RumbleState {
    fn default() -> Self {
        Self::new()
    }
}

impl RumbleState {
    pub fn new() -> Self {
        Self {
            phase: RumblePhase::Idle,
            last_energy: 0.0,
            last_sample: None,
            last_change: None,
        }
    }

    pub fn phase(&self) -> RumblePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, RumblePhase::Active { .. })
    }

    /// Feed the newest decoded sample of this tick.
    pub fn on_sample(&mut self, sample: RumbleSample, now: Instant) -> HapticCommand {
        self.last_sample = Some(now);
        let energy = sample.energy();
        if energy < MIN_ACTIVE {
            self.phase = RumblePhase::Idle;
            self.last_energy = 0.0;
            return HapticCommand::Stop;
        }

        if energy != self.last_energy || self.last_change.is_none() {
            self.last_change = Some(now);
        }
        self.last_energy = energy;
        self.phase = RumblePhase::Active { energy };

        HapticCommand::Play {
            low: intensity(sample.left),
            high: intensity(sample.right),
        }
    }

    /// Called on ticks that produced no sample.
    pub fn on_quiet_tick(&mut self, now: Instant) -> Option<HapticCommand> {
        if !self.is_active() {
            return None;
        }
        let quiet_for = self
            .last_sample
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        let unchanged_for = self
            .last_change
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));

        if quiet_for > IDLE_TIMEOUT || unchanged_for > STUCK_TIMEOUT {
            self.silence();
            return Some(HapticCommand::Stop);
        }
        None
    }

    /// Forget any active rumble, e.g. after the transport went away.
    pub fn silence(&mut self) {
        self.phase = RumblePhase::Idle;
        self.last_energy = 0.0;
    }
}

fn intensity(amplitude: f32) -> u16 {
    ((amplitude * RUMBLE_SCALE).clamp(0.0, 1.0) * f32::from(u16::MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(left: f32, right: f32) -> RumbleSample {
        RumbleSample { left, right }
    }

    #[test]
    fn weak_sample_is_silence() {
        let mut state = RumbleState::new();
        let now = Instant::now();
        assert_eq!(state.on_sample(sample(0.49, 0.2), now), HapticCommand::Stop);
        assert_eq!(state.phase(), RumblePhase::Idle);
    }

    #[test]
    fn strong_sample_is_scaled() {
        let mut state = RumbleState::new();
        let now = Instant::now();
        let command = state.on_sample(sample(1.0, 0.5), now);
        assert_eq!(
            command,
            HapticCommand::Play {
                low: (0.8 * 65535.0) as u16,
                high: (0.4 * 65535.0) as u16,
            }
        );
        assert_eq!(state.phase(), RumblePhase::Active { energy: 1.0 });
    }

    #[test]
    fn idle_timeout_is_exclusive() {
        let mut state = RumbleState::new();
        let start = Instant::now();
        state.on_sample(sample(0.9, 0.9), start);

        assert_eq!(state.on_quiet_tick(start + IDLE_TIMEOUT), None);
        assert!(state.is_active());
        assert_eq!(
            state.on_quiet_tick(start + IDLE_TIMEOUT + Duration::from_millis(1)),
            Some(HapticCommand::Stop)
        );
        assert!(!state.is_active());
        // Already idle, nothing more to do
        assert_eq!(state.on_quiet_tick(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn stuck_energy_is_cut() {
        let mut state = RumbleState::new();
        let start = Instant::now();
        let mut now = start;
        // Same energy every 100ms keeps the idle timer fresh
        while now.duration_since(start) <= STUCK_TIMEOUT {
            state.on_sample(sample(0.7, 0.7), now);
            assert_eq!(state.on_quiet_tick(now), None);
            now += Duration::from_millis(100);
        }
        assert_eq!(state.on_quiet_tick(now), Some(HapticCommand::Stop));
    }

    #[test]
    fn changing_energy_keeps_playing() {
        let mut state = RumbleState::new();
        let start = Instant::now();
        for step in 0..20u32 {
            let now = start + Duration::from_millis(100) * step;
            let level = if step % 2 == 0 { 0.7 } else { 0.8 };
            state.on_sample(sample(level, 0.0), now);
            assert_eq!(state.on_quiet_tick(now + Duration::from_millis(50)), None);
        }
    }

    #[test]
    fn silence_resets() {
        let mut state = RumbleState::new();
        let now = Instant::now();
        state.on_sample(sample(1.0, 1.0), now);
        state.silence();
        assert_eq!(state.phase(), RumblePhase::Idle);
        assert_eq!(state.on_quiet_tick(now + Duration::from_secs(1)), None);
    }
}
