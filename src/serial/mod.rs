//! Serial side of the bridge
//!
//! 1. [`uart`] - `serialport` backed discovery and transports
//! 2. [`port_registry`] - Pairing pool and port bookkeeping
//!
//! The scheduler only talks to the [`PortProvider`] and [`Transport`] traits.

pub mod port_registry;
pub mod uart;

use crate::error::TransportError;

/// A listed serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub path: String,
    pub description: String,
    /// The OS reported USB vendor/product ids for this port.
    pub has_usb_ids: bool,
    pub manufacturer: Option<String>,
}

impl PortInfo {
    /// Best-effort guess whether this is a USB serial adapter.
    pub fn is_usb(&self) -> bool {
        if self.has_usb_ids {
            return true;
        }
        if self
            .manufacturer
            .as_deref()
            .is_some_and(|m| m.to_uppercase().contains("USB"))
        {
            return true;
        }
        is_usb_path(&self.path)
    }
}

const USB_PATH_PREFIXES: [&str; 4] = ["/dev/ttyusb", "/dev/ttyacm", "/dev/cu.usb", "/dev/tty.usb"];

/// Path prefixes used by USB serial adapters on Linux and macOS.
pub fn is_usb_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    USB_PATH_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Which listed ports are candidates for pairing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFilter {
    pub include_non_usb: bool,
    /// Lowercase substrings; when non-empty a description must contain one.
    pub include_descriptions: Vec<String>,
    /// Lowercase substrings; a description containing any is skipped.
    pub ignore_descriptions: Vec<String>,
}

impl PortFilter {
    pub fn accepts(&self, port: &PortInfo) -> bool {
        if port.path.is_empty() {
            return false;
        }
        if !self.include_non_usb && !port.is_usb() {
            return false;
        }
        let description = port.description.to_lowercase();
        if !self.include_descriptions.is_empty()
            && !self
                .include_descriptions
                .iter()
                .any(|keep| description.contains(keep.as_str()))
        {
            return false;
        }
        !self
            .ignore_descriptions
            .iter()
            .any(|skip| description.contains(skip.as_str()))
    }

    pub fn apply(&self, ports: Vec<PortInfo>) -> Vec<PortInfo> {
        ports.into_iter().filter(|p| self.accepts(p)).collect()
    }
}

/// An open byte stream to one peripheral. Dropping it closes the port.
pub trait Transport {
    fn path(&self) -> &str;

    /// Write a whole frame. [`TransportError::WouldBlock`] means the frame was
    /// dropped and the link is still usable.
    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Append whatever bytes are pending to `buffer` without blocking.
    fn read_available(&mut self, buffer: &mut Vec<u8>) -> Result<usize, TransportError>;
}

/// Serial port enumeration and opening.
pub trait PortProvider {
    fn discover(&mut self) -> Result<Vec<PortInfo>, TransportError>;

    fn open(&mut self, path: &str, baud: u32) -> Result<Box<dyn Transport>, TransportError>;
}
