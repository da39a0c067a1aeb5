use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::cli::Args;
use crate::controller::input_transform::{LayoutOverrides, TransformSettings};
use crate::error::ConfigError;
use crate::protocol::DEFAULT_BAUD;
use crate::serial::port_registry::PortPolicy;
use crate::serial::PortFilter;
use crate::session::SessionSettings;

const AXIS_MAX: f64 = 32767.0;

/// Explicit controller-index to serial-port binding, written `index:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortMapping {
    pub index: usize,
    pub port: String,
}

impl FromStr for PortMapping {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, port) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidMapping(s.to_string()))?;
        let index = index
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidControllerIndex(index.to_string()))?;
        let port = port.trim();
        if port.is_empty() {
            return Err(ConfigError::EmptyPort(s.to_string()));
        }
        Ok(Self {
            index,
            port: port.to_string(),
        })
    }
}

impl TryFrom<String> for PortMapping {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortMapping> for String {
    fn from(mapping: PortMapping) -> Self {
        mapping.to_string()
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.port)
    }
}

/// Everything the bridge can be configured with, from file and flags.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub baud: u32,
    /// Report send rate in Hz.
    pub frequency: f64,
    /// Stick deadzone as a fraction of full scale.
    pub deadzone: f64,
    /// Trigger press threshold as a fraction of full scale.
    pub trigger_threshold: f64,
    pub zero_sticks: bool,
    /// Seconds between serial port scans.
    pub port_scan_interval: f64,
    /// Seconds between reopen attempts of a lost link.
    pub reconnect_interval: f64,
    pub mappings: Vec<PortMapping>,
    /// Fixed pool of ports for auto pairing; disables discovery.
    pub ports: Vec<String>,
    pub include_non_usb: bool,
    pub include_port_desc: Vec<String>,
    pub ignore_port_desc: Vec<String>,
    pub controller_names: Vec<String>,
    pub swap_abxy: bool,
    pub swap_abxy_indices: Vec<usize>,
    pub swap_abxy_guids: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            frequency: 500.0,
            deadzone: 0.08,
            trigger_threshold: 0.35,
            zero_sticks: false,
            port_scan_interval: 2.0,
            reconnect_interval: 1.0,
            mappings: Vec::new(),
            ports: Vec::new(),
            include_non_usb: false,
            include_port_desc: Vec::new(),
            ignore_port_desc: Vec::new(),
            controller_names: Vec::new(),
            swap_abxy: false,
            swap_abxy_indices: Vec::new(),
            swap_abxy_guids: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("padbridge").join("config.toml"))
    }

    /// Load from `path`, or from the default location when it exists.
    ///
    /// An explicitly given file must exist; a missing default file yields the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Command line flags win over file values.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(baud) = args.baud {
            self.baud = baud;
        }
        if let Some(frequency) = args.frequency {
            self.frequency = frequency;
        }
        if let Some(deadzone) = args.deadzone {
            self.deadzone = deadzone;
        }
        if let Some(threshold) = args.trigger_threshold {
            self.trigger_threshold = threshold;
        }
        self.zero_sticks |= args.zero_sticks;
        self.include_non_usb |= args.all_ports;
        self.swap_abxy |= args.swap_abxy;

        if !args.map.is_empty() {
            self.mappings = args.map.clone();
        }
        if !args.ports.is_empty() {
            self.ports = args.ports.clone();
        }
        self.include_port_desc.extend(args.include_port_desc.iter().cloned());
        self.ignore_port_desc.extend(args.ignore_port_desc.iter().cloned());
        self.controller_names.extend(args.controller_name.iter().cloned());
        self.swap_abxy_indices.extend(args.swap_abxy_index.iter().copied());
        self.swap_abxy_guids.extend(args.swap_abxy_guid.iter().cloned());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud == 0 {
            return Err(ConfigError::OutOfRange {
                name: "baud",
                value: 0.0,
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }
        check_positive("frequency", self.frequency)?;
        check_interval("port_scan_interval", self.port_scan_interval)?;
        check_interval("reconnect_interval", self.reconnect_interval)?;
        check_fraction("deadzone", self.deadzone)?;
        check_fraction("trigger_threshold", self.trigger_threshold)?;
        self.explicit_mappings().map(|_| ())
    }

    /// Explicit mappings keyed by controller index.
    ///
    /// A port may be mapped to only one controller.
    pub fn explicit_mappings(&self) -> Result<HashMap<usize, String>, ConfigError> {
        let mut by_index = HashMap::new();
        let mut ports = HashSet::new();
        for mapping in &self.mappings {
            if !ports.insert(mapping.port.as_str()) {
                return Err(ConfigError::InvalidMapping(format!(
                    "{} (port already mapped)",
                    mapping
                )));
            }
            if by_index
                .insert(mapping.index, mapping.port.clone())
                .is_some()
            {
                return Err(ConfigError::InvalidMapping(format!(
                    "{} (controller already mapped)",
                    mapping
                )));
            }
        }
        Ok(by_index)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency.max(1.0))
    }

    pub fn deadzone_raw(&self) -> i32 {
        (self.deadzone * AXIS_MAX) as i32
    }

    pub fn trigger_threshold_raw(&self) -> i16 {
        (self.trigger_threshold * AXIS_MAX) as i16
    }

    pub fn port_policy(&self) -> PortPolicy {
        PortPolicy::derive(!self.mappings.is_empty(), !self.ports.is_empty())
    }

    pub fn port_filter(&self) -> PortFilter {
        PortFilter {
            include_non_usb: self.include_non_usb,
            include_descriptions: lowercase(&self.include_port_desc),
            ignore_descriptions: lowercase(&self.ignore_port_desc),
        }
    }

    pub fn layout_overrides(&self) -> LayoutOverrides {
        LayoutOverrides {
            swap_all: self.swap_abxy,
            swap_guids: lowercase(&self.swap_abxy_guids).into_iter().collect(),
            swap_indices: self.swap_abxy_indices.iter().copied().collect(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            transform: TransformSettings {
                deadzone: self.deadzone_raw(),
                trigger_threshold: self.trigger_threshold_raw(),
            },
            send_interval: self.send_interval(),
            reconnect_interval: Duration::from_secs_f64(self.reconnect_interval),
            baud: self.baud,
            zero_on_connect: self.zero_sticks,
            name_filters: lowercase(&self.controller_names),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs_f64(self.port_scan_interval)
    }
}

fn lowercase(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        return Ok(());
    }
    Err(ConfigError::OutOfRange {
        name,
        value,
        min: f64::MIN_POSITIVE,
        max: f64::MAX,
    })
}

/// Longest accepted scan or reconnect interval, in seconds.
const MAX_INTERVAL_SECS: f64 = 3600.0;

fn check_interval(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= MAX_INTERVAL_SECS {
        return Ok(());
    }
    Err(ConfigError::OutOfRange {
        name,
        value,
        min: f64::MIN_POSITIVE,
        max: MAX_INTERVAL_SECS,
    })
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        return Ok(());
    }
    Err(ConfigError::OutOfRange {
        name,
        value,
        min: 0.0,
        max: 1.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn mapping_syntax() {
        let mapping: PortMapping = "0:/dev/ttyUSB0".parse().expect("valid mapping");
        assert_eq!(mapping.index, 0);
        assert_eq!(mapping.port, "/dev/ttyUSB0");

        // Windows style ports keep working since only the first colon splits
        let mapping: PortMapping = "2:COM5".parse().expect("valid mapping");
        assert_eq!(mapping.port, "COM5");

        assert!(matches!(
            "ttyUSB0".parse::<PortMapping>(),
            Err(ConfigError::InvalidMapping(_))
        ));
        assert!(matches!(
            "x:/dev/ttyUSB0".parse::<PortMapping>(),
            Err(ConfigError::InvalidControllerIndex(_))
        ));
        assert!(matches!(
            "1: ".parse::<PortMapping>(),
            Err(ConfigError::EmptyPort(_))
        ));
    }

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.baud, 921_600);
        assert_eq!(config.send_interval(), Duration::from_millis(2));
        assert_eq!(config.deadzone_raw(), 2621);
        assert_eq!(config.trigger_threshold_raw(), 11468);
        assert_eq!(
            config.port_policy(),
            PortPolicy {
                auto_pairing: true,
                auto_discovery: true
            }
        );
    }

    #[test]
    fn frequency_below_one_hz_is_clamped() {
        let config = BridgeConfig {
            frequency: 0.25,
            ..Default::default()
        };
        assert_eq!(config.send_interval(), Duration::from_secs(1));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let bad = [
            BridgeConfig {
                frequency: 0.0,
                ..Default::default()
            },
            BridgeConfig {
                deadzone: 1.5,
                ..Default::default()
            },
            BridgeConfig {
                trigger_threshold: -0.1,
                ..Default::default()
            },
            BridgeConfig {
                baud: 0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn huge_intervals_are_rejected() {
        let config = BridgeConfig::from_toml("reconnect_interval = 1e20\n")
            .expect("parses");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                name: "reconnect_interval",
                ..
            })
        ));

        let config = BridgeConfig {
            port_scan_interval: f64::INFINITY,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            port_scan_interval: 3600.0,
            reconnect_interval: 0.01,
            ..Default::default()
        };
        config.validate().expect("bounds are inclusive");
        assert_eq!(config.scan_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn duplicate_port_mapping_is_rejected() {
        let config = BridgeConfig {
            mappings: vec![
                "0:/dev/ttyUSB0".parse().expect("valid mapping"),
                "1:/dev/ttyUSB0".parse().expect("valid mapping"),
            ],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMapping(_))
        ));
    }

    #[test]
    fn toml_file_with_partial_fields() {
        let config = BridgeConfig::from_toml(
            r#"
            frequency = 250.0
            mappings = ["0:/dev/ttyACM0", "1:/dev/ttyACM1"]
            swap_abxy_indices = [1]
            "#,
        )
        .expect("parses");
        assert_eq!(config.frequency, 250.0);
        assert_eq!(config.baud, DEFAULT_BAUD);
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.mappings[1].port, "/dev/ttyACM1");
        assert!(!config.port_policy().auto_pairing);
        assert!(config.layout_overrides().swap_indices.contains(&1));
    }

    #[test]
    fn malformed_mapping_in_file_fails_to_parse() {
        assert!(BridgeConfig::from_toml(r#"mappings = ["nope"]"#).is_err());
    }

    #[test]
    fn explicit_port_list_disables_discovery() {
        let config = BridgeConfig {
            ports: vec!["/dev/ttyUSB0".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.port_policy(),
            PortPolicy {
                auto_pairing: true,
                auto_discovery: false
            }
        );
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = BridgeConfig {
            frequency: 100.0,
            mappings: vec!["0:/dev/ttyACM0".parse().expect("valid mapping")],
            ..Default::default()
        };
        let args = Args::try_parse_from([
            "padbridge",
            "--frequency",
            "1000",
            "--map",
            "3:/dev/ttyUSB9",
            "--controller-name",
            "Pro Controller",
            "--zero-sticks",
        ])
        .expect("valid args");
        config.apply_args(&args);

        assert_eq!(config.frequency, 1000.0);
        assert_eq!(config.mappings.len(), 1);
        assert_eq!(config.mappings[0].index, 3);
        assert!(config.zero_sticks);
        assert_eq!(
            config.session_settings().name_filters,
            vec!["pro controller".to_string()]
        );
    }
}
