//! padbridge: game controllers to serial peripherals, rumble back to the pads.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod serial;
pub mod session;

#[cfg(test)]
mod testing;
