use std::path::PathBuf;

use clap::Parser;

use crate::config::PortMapping;

#[derive(Parser, Debug, Clone)]
#[command(name = "padbridge")]
#[command(version)]
#[command(about = "Bridge game controllers to serial peripherals and mirror rumble back")]
pub struct Args {
    /// Config file (defaults to <config dir>/padbridge/config.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// List connected controllers with their index and GUID, then exit
    #[arg(long)]
    pub list_controllers: bool,

    /// Bind a controller index to a serial port, e.g. 0:/dev/ttyUSB0 (repeatable)
    #[arg(short, long, value_name = "INDEX:PORT")]
    pub map: Vec<PortMapping>,

    /// Serial ports to auto pair, in order; disables port discovery
    #[arg(long, num_args = 1..)]
    pub ports: Vec<String>,

    /// Include non-USB serial ports in discovery
    #[arg(long)]
    pub all_ports: bool,

    /// Only use ports whose description contains this text (repeatable)
    #[arg(long, value_name = "TEXT")]
    pub include_port_desc: Vec<String>,

    /// Skip ports whose description contains this text (repeatable)
    #[arg(long, value_name = "TEXT")]
    pub ignore_port_desc: Vec<String>,

    /// Only bridge controllers whose name contains this text (repeatable)
    #[arg(long, value_name = "TEXT")]
    pub controller_name: Vec<String>,

    /// Serial baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Report send rate in Hz
    #[arg(long)]
    pub frequency: Option<f64>,

    /// Stick deadzone as a fraction (0.0 - 1.0)
    #[arg(long)]
    pub deadzone: Option<f64>,

    /// Trigger press threshold as a fraction (0.0 - 1.0)
    #[arg(long)]
    pub trigger_threshold: Option<f64>,

    /// Capture stick centers when a controller connects
    #[arg(long)]
    pub zero_sticks: bool,

    /// Swap A/B and X/Y on every controller
    #[arg(long)]
    pub swap_abxy: bool,

    /// Swap A/B and X/Y on the controller with this index (repeatable)
    #[arg(long, value_name = "INDEX")]
    pub swap_abxy_index: Vec<usize>,

    /// Swap A/B and X/Y on the controller with this GUID (repeatable)
    #[arg(long, value_name = "GUID")]
    pub swap_abxy_guid: Vec<String>,
}
