use crate::engine::OobPolicy;
use crate::session::SessionConfig;
use log::{error, info};
use std::collections::HashMap;
use std::process::Command;
use std::time::Duration;

const UCI_PREFIX: &str = "gsm-modem.config.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionType {
    Network,
    Serial,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub modem: ModemConfig,
    pub session: SessionConfig,
    /// Delete each stored message once it has been read and logged.
    pub delete_after_read: bool,
}

#[derive(Debug, Clone)]
pub struct ModemConfig {
    pub connection_type: ConnectionType,
    pub network: NetworkConfig,
    pub serial: SerialConfig,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baudrate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            modem: ModemConfig {
                connection_type: ConnectionType::Serial,
                network: NetworkConfig {
                    host: "192.168.8.1".to_string(),
                    port: 20249,
                    timeout: 10,
                },
                serial: SerialConfig {
                    port: "/dev/ttyUSB0".to_string(),
                    baudrate: 115200,
                },
            },
            session: SessionConfig {
                command_timeout: Some(Duration::from_secs(10)),
                oob_capacity: 16,
                oob_policy: OobPolicy::Block,
            },
            delete_after_read: true,
        }
    }
}

/// Parse `uci show gsm-modem` output into short key/value pairs.
pub fn parse_uci(stdout: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once('=') {
            if let Some(short_key) = key.strip_prefix(UCI_PREFIX) {
                let clean_value = value.trim().trim_matches('\'').trim_matches('"').to_string();
                values.insert(short_key.to_string(), clean_value);
            }
        }
    }
    values
}

impl Config {
    /// Load from UCI when available, then apply `GSM_*` environment
    /// overrides.
    pub fn load() -> Self {
        info!("Loading configuration from UCI...");

        let mut values = match Command::new("uci").args(["show", "gsm-modem"]).output() {
            Ok(output) if output.status.success() => {
                parse_uci(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(_) => {
                error!("UCI command returned non-zero status. Using default config.");
                HashMap::new()
            }
            Err(e) => {
                info!("UCI not available ({}). Using default config.", e);
                HashMap::new()
            }
        };

        // Env var overrides (for local debugging)
        for (key, value) in std::env::vars() {
            if let Some(short_key) = key.strip_prefix("GSM_") {
                values.insert(short_key.to_ascii_lowercase(), value);
            }
        }

        let config = Self::from_values(&values);
        info!("Loaded configuration: {:?}", config);
        config
    }

    /// Build a config from flat key/value pairs, falling back to defaults
    /// for missing or unparsable entries.
    pub fn from_values(values: &HashMap<String, String>) -> Self {
        let mut config = Config::default();

        let get_str = |key: &str, default: &str| -> String {
            values.get(key).cloned().unwrap_or_else(|| default.to_string())
        };

        let get_bool = |key: &str, default: bool| -> bool {
            match values.get(key).map(|s| s.as_str()) {
                Some("1") | Some("true") | Some("on") => true,
                Some("0") | Some("false") | Some("off") => false,
                _ => default,
            }
        };

        let get_u64 = |key: &str, default: u64| -> u64 {
            values.get(key).and_then(|s| s.parse().ok()).unwrap_or(default)
        };

        config.modem.connection_type = match get_str("connection_type", "SERIAL").as_str() {
            "NETWORK" => ConnectionType::Network,
            _ => ConnectionType::Serial,
        };

        config.modem.network.host = get_str("network_host", &config.modem.network.host);
        config.modem.network.port = values
            .get("network_port")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.modem.network.port);
        config.modem.network.timeout = get_u64("network_timeout", config.modem.network.timeout);

        config.modem.serial.port = get_str("serial_port", &config.modem.serial.port);
        config.modem.serial.baudrate = values
            .get("serial_baudrate")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.modem.serial.baudrate);

        // 0 disables the deadline
        config.session.command_timeout = match get_u64("command_timeout", 10) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        config.session.oob_capacity = values
            .get("oob_capacity")
            .and_then(|s| s.parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(config.session.oob_capacity);
        config.session.oob_policy = match get_str("oob_policy", "block").as_str() {
            "drop" => OobPolicy::Drop,
            _ => OobPolicy::Block,
        };

        config.delete_after_read = get_bool("delete_after_read", config.delete_after_read);
        config
    }
}
