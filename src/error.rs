//! Error definitions for the bridge
//!
//! Recoverable conditions (transport hiccups, haptics the device cannot play)
//! are kept apart from the fatal ones (bad configuration, no input subsystem) so
//! the loop can degrade instead of exiting.

use std::path::PathBuf;

use thiserror::Error;

use crate::controller::InstanceId;

/// Configuration problems. All of them are fatal before the loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Mapping must look like 'index:serial_port', got '{0}'")]
    InvalidMapping(String),

    #[error("Invalid controller index '{0}'")]
    InvalidControllerIndex(String),

    #[error("Serial port cannot be empty in mapping '{0}'")]
    EmptyPort(String),

    #[error("{name} must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Serial transport failures. Recovered by tearing the binding down and retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("{path} disconnected: {reason}")]
    Disconnected { path: String, reason: String },

    #[error("{path} is not ready for more data")]
    WouldBlock { path: String },

    #[error("Failed to list serial ports: {0}")]
    Discovery(String),
}

impl TransportError {
    /// True when the link itself is gone rather than momentarily busy.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected { .. })
    }
}

/// Haptic command failures. Logged, never fatal.
#[derive(Debug, Error)]
pub enum HapticError {
    #[error("Controller {0} does not support force feedback")]
    Unsupported(InstanceId),

    #[error("Controller {0} is not connected")]
    UnknownDevice(InstanceId),

    #[error("Force feedback error: {0}")]
    Backend(#[from] gilrs::ff::Error),
}

/// Errors surfaced to the caller of the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to initialise the controller subsystem: {0}")]
    Enumeration(String),
}
