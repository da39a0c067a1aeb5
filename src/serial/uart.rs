use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use tracing::{debug, info};

use super::{PortInfo, PortProvider, Transport};
use crate::error::TransportError;

/// Lists and opens real serial ports.
#[derive(Debug, Default)]
pub struct SerialPortProvider;

impl PortProvider for SerialPortProvider {
    fn discover(&mut self) -> Result<Vec<PortInfo>, TransportError> {
        let ports = serialport::available_ports()
            .map_err(|e| TransportError::Discovery(e.to_string()))?;

        Ok(ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => PortInfo {
                    path: port.port_name,
                    description: usb.product.unwrap_or_else(|| "Unknown".to_string()),
                    has_usb_ids: true,
                    manufacturer: usb.manufacturer,
                },
                SerialPortType::BluetoothPort => PortInfo {
                    path: port.port_name,
                    description: "Bluetooth".to_string(),
                    has_usb_ids: false,
                    manufacturer: None,
                },
                _ => PortInfo {
                    path: port.port_name,
                    description: "Unknown".to_string(),
                    has_usb_ids: false,
                    manufacturer: None,
                },
            })
            .collect())
    }

    fn open(&mut self, path: &str, baud: u32) -> Result<Box<dyn Transport>, TransportError> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::ZERO)
            .open()
            .map_err(|e| TransportError::Open {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        info!("Opened {} at {} baud", path, baud);
        Ok(Box::new(UartTransport {
            path: path.to_string(),
            port,
            outbox: Outbox::default(),
            scratch: Vec::new(),
        }))
    }
}

fn is_busy(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// Frame bytes the driver has not accepted yet.
///
/// A frame the port only partly took is finished before the next one starts,
/// so the wire never carries a truncated report followed by a new header.
#[derive(Debug, Default)]
struct Outbox {
    unsent: Vec<u8>,
}

impl Outbox {
    /// Write as much of the queued tail as the port takes. `Ok(true)` once
    /// nothing is left.
    fn flush<W: Write + ?Sized>(&mut self, writer: &mut W) -> std::io::Result<bool> {
        while !self.unsent.is_empty() {
            match writer.write(&self.unsent) {
                Ok(0) => return Ok(false),
                Ok(written) => {
                    self.unsent.drain(..written);
                }
                Err(e) if is_busy(&e) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Queue a frame behind any unfinished one. `Ok(false)` drops the frame
    /// because the previous one is still going out.
    fn send<W: Write + ?Sized>(&mut self, writer: &mut W, frame: &[u8]) -> std::io::Result<bool> {
        if !self.flush(writer)? {
            return Ok(false);
        }
        self.unsent.extend_from_slice(frame);
        self.flush(writer)?;
        Ok(true)
    }
}

/// One open serial link to a peripheral.
pub struct UartTransport {
    path: String,
    port: Box<dyn SerialPort>,
    outbox: Outbox,
    scratch: Vec<u8>,
}

impl UartTransport {
    fn io_error(&self, error: std::io::Error) -> TransportError {
        if is_busy(&error) {
            return TransportError::WouldBlock {
                path: self.path.clone(),
            };
        }
        TransportError::Disconnected {
            path: self.path.clone(),
            reason: error.to_string(),
        }
    }
}

impl Transport for UartTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self.outbox.send(&mut self.port, bytes) {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::WouldBlock {
                path: self.path.clone(),
            }),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn read_available(&mut self, buffer: &mut Vec<u8>) -> Result<usize, TransportError> {
        let pending = self
            .port
            .bytes_to_read()
            .map_err(|e| TransportError::Disconnected {
                path: self.path.clone(),
                reason: e.to_string(),
            })? as usize;
        if pending == 0 {
            return Ok(0);
        }

        self.scratch.resize(pending, 0);
        let read = match self.port.read(&mut self.scratch) {
            Ok(read) => read,
            Err(e) => {
                return match self.io_error(e) {
                    TransportError::WouldBlock { .. } => Ok(0),
                    other => Err(other),
                }
            }
        };
        debug!("Read {} bytes from {}", read, self.path);
        buffer.extend_from_slice(&self.scratch[..read]);
        Ok(read)
    }
}

impl Drop for UartTransport {
    fn drop(&mut self) {
        debug!("Closing {}", self.path);
    }
}
