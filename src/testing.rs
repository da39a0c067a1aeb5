//! Scripted stand-ins for the input subsystem and the serial ports.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::controller::{DeviceInfo, Haptics, InputBackend, InstanceId, RawControllerEvent};
use crate::error::{HapticError, TransportError};
use crate::serial::{PortInfo, PortProvider, Transport};

pub fn device(instance: InstanceId, name: &str) -> DeviceInfo {
    DeviceInfo {
        instance,
        index: instance,
        name: name.to_string(),
        guid: format!("{:032x}", instance + 0xab00),
    }
}

pub fn usb_port(path: &str) -> PortInfo {
    PortInfo {
        path: path.to_string(),
        description: "USB Serial".to_string(),
        has_usb_ids: true,
        manufacturer: None,
    }
}

#[derive(Debug, Default)]
pub struct BackendState {
    pub devices: Vec<DeviceInfo>,
    pub events: VecDeque<RawControllerEvent>,
    /// Every rumble call as (instance, low, high).
    pub rumbles: Vec<(InstanceId, u16, u16)>,
    pub closed: Vec<InstanceId>,
}

impl BackendState {
    pub fn last_rumble(&self, instance: InstanceId) -> Option<(u16, u16)> {
        self.rumbles
            .iter()
            .rev()
            .find(|(i, _, _)| *i == instance)
            .map(|(_, low, high)| (*low, *high))
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockBackend {
    pub state: Rc<RefCell<BackendState>>,
}

impl MockBackend {
    pub fn push(&self, event: RawControllerEvent) {
        self.state.borrow_mut().events.push_back(event);
    }
}

impl Haptics for MockBackend {
    fn rumble(
        &mut self,
        instance: InstanceId,
        low: u16,
        high: u16,
        _duration: Duration,
    ) -> Result<(), HapticError> {
        self.state.borrow_mut().rumbles.push((instance, low, high));
        Ok(())
    }
}

impl InputBackend for MockBackend {
    fn enumerate(&mut self) -> Vec<DeviceInfo> {
        self.state.borrow().devices.clone()
    }

    fn next_event(&mut self) -> Option<RawControllerEvent> {
        self.state.borrow_mut().events.pop_front()
    }

    fn close(&mut self, instance: InstanceId) {
        self.state.borrow_mut().closed.push(instance);
    }
}

/// Bytes crossing one fake serial link.
#[derive(Debug, Default)]
pub struct LinkState {
    pub written: Vec<Vec<u8>>,
    pub inbound: Vec<u8>,
    pub broken: bool,
    /// Writes fail with `WouldBlock` while set.
    pub busy: bool,
    pub write_attempts: usize,
    pub open: bool,
}

#[derive(Debug, Default)]
pub struct PortsState {
    pub listed: Vec<PortInfo>,
    pub links: HashMap<String, Rc<RefCell<LinkState>>>,
    pub refuse_open: HashSet<String>,
    pub opens: Vec<String>,
}

impl PortsState {
    pub fn link(&mut self, path: &str) -> Rc<RefCell<LinkState>> {
        self.links.entry(path.to_string()).or_default().clone()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockPorts {
    pub state: Rc<RefCell<PortsState>>,
}

impl MockPorts {
    pub fn with_ports(paths: &[&str]) -> Self {
        let ports = Self::default();
        ports.state.borrow_mut().listed = paths.iter().map(|p| usb_port(p)).collect();
        ports
    }

    pub fn link(&self, path: &str) -> Rc<RefCell<LinkState>> {
        self.state.borrow_mut().link(path)
    }

    pub fn unplug(&self, path: &str) {
        let mut state = self.state.borrow_mut();
        state.listed.retain(|p| p.path != path);
        state.refuse_open.insert(path.to_string());
        state.link(path).borrow_mut().broken = true;
    }
}

impl PortProvider for MockPorts {
    fn discover(&mut self) -> Result<Vec<PortInfo>, TransportError> {
        Ok(self.state.borrow().listed.clone())
    }

    fn open(&mut self, path: &str, _baud: u32) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = self.state.borrow_mut();
        state.opens.push(path.to_string());
        if state.refuse_open.contains(path) {
            return Err(TransportError::Open {
                path: path.to_string(),
                reason: "No such device".to_string(),
            });
        }
        let link = state.link(path);
        {
            let mut link = link.borrow_mut();
            link.broken = false;
            link.open = true;
        }
        Ok(Box::new(MockTransport {
            path: path.to_string(),
            link,
        }))
    }
}

pub struct MockTransport {
    path: String,
    link: Rc<RefCell<LinkState>>,
}

impl Transport for MockTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut link = self.link.borrow_mut();
        link.write_attempts += 1;
        if link.broken {
            return Err(TransportError::Disconnected {
                path: self.path.clone(),
                reason: "write failed".to_string(),
            });
        }
        if link.busy {
            return Err(TransportError::WouldBlock {
                path: self.path.clone(),
            });
        }
        link.written.push(bytes.to_vec());
        Ok(())
    }

    fn read_available(&mut self, buffer: &mut Vec<u8>) -> Result<usize, TransportError> {
        let mut link = self.link.borrow_mut();
        if link.broken {
            return Err(TransportError::Disconnected {
                path: self.path.clone(),
                reason: "read failed".to_string(),
            });
        }
        let read = link.inbound.len();
        buffer.append(&mut link.inbound);
        Ok(read)
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        self.link.borrow_mut().open = false;
    }
}
