//! Line based console commands read from stdin
//!
//! `z` re-zeros sticks, `x <instance>` toggles a controller's button layout,
//! `s` prints session status and `q` quits.

use std::io::BufRead;
use std::str::FromStr;
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCommand {
    ZeroSticks,
    ToggleLayout(InstanceId),
    Status,
    Quit,
}

impl FromStr for BridgeCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = words.next().ok_or_else(|| "empty command".to_string())?;
        let parsed = match command.to_lowercase().as_str() {
            "z" | "zero" => BridgeCommand::ZeroSticks,
            "s" | "status" => BridgeCommand::Status,
            "q" | "quit" => BridgeCommand::Quit,
            "x" | "swap" => {
                let instance = words
                    .next()
                    .ok_or_else(|| "usage: x <instance>".to_string())?;
                let instance = instance
                    .parse::<InstanceId>()
                    .map_err(|_| format!("invalid controller instance '{}'", instance))?;
                BridgeCommand::ToggleLayout(instance)
            }
            other => return Err(format!("unknown command '{}'", other)),
        };
        if words.next().is_some() {
            return Err(format!("unexpected arguments in '{}'", s.trim()));
        }
        Ok(parsed)
    }
}

/// Read commands from stdin on a plain thread and forward them to the loop.
///
/// The thread ends at end of input, after `q`, or once the loop dropped the
/// receiver.
pub fn spawn_console_reader(sender: mpsc::Sender<BridgeCommand>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<BridgeCommand>() {
                    Ok(command) => {
                        if sender.blocking_send(command).is_err() {
                            break;
                        }
                        if command == BridgeCommand::Quit {
                            break;
                        }
                    }
                    Err(e) => warn!("{}", e),
                }
            }
            debug!("Console reader finished");
        })
}
