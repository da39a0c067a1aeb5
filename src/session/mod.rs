//! Per-controller sessions
//!
//! 1. [`rumble`] - Haptic feedback state machine
//! 2. [`session`] - One controller, its report and its serial link
//! 3. [`manager`] - Pairing, reconnects and servicing of every session
//!
//! ```text
//! Unbound ──assign──► Connecting ──open──► Connected
//!    ▲                    │                   │
//!    │                    ▼                   ▼ transport error
//!    └── port removed ── Waiting ◄────────────┘
//!                         │  reopen after backoff
//!                         └──────────► Connected
//! ```
//!
//! A controller disconnect closes the session from any state.

pub mod manager;
pub mod rumble;
#[allow(clippy::module_inception)]
pub mod session;

pub use manager::{SessionManager, SessionSettings, SessionStatus, ToggleRefused};
pub use rumble::{HapticCommand, RumbleState};
pub use session::{ControllerSession, SessionState};
