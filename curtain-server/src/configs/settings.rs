use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use curtain_link::LinkConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Serial {
    /// Empty means the first port the system reports.
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub reset_delay_ms: u64,
    pub handshake_delay_ms: u64,
    pub handshake_gap_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub auto_connect: bool,
}

impl Serial {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            reset_delay: Duration::from_millis(self.reset_delay_ms),
            handshake_delay: Duration::from_millis(self.handshake_delay_ms),
            handshake_gap: Duration::from_millis(self.handshake_gap_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mqtt {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub retry_delay_secs: u64,
    pub credentials: Option<MqttCredentials>,
    pub tls: Option<MqttTls>,
    pub topics: Topics,
    pub publish_interval: PublishInterval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttTls {
    pub ca_path: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topics {
    pub light_reading: String,
    pub position_status: String,
    pub control_command: String,
    pub system_status: String,
    pub alerts: String,
    pub heartbeat: String,
}

/// Seconds between publications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishInterval {
    pub light: u64,
    pub status: u64,
    pub heartbeat: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub url: String,
    pub clean_start: bool,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub dark: i32,
    pub bright: i32,
    /// Applied by the device firmware; reported here, not used by the auto-mode check.
    pub hysteresis: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Motor {
    pub default_speed: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curtain {
    pub thresholds: Thresholds,
    pub motor: Motor,
    pub auto_interval_secs: u64,
    pub auto_min_action_secs: u64,
    pub mode_confirm_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub logger: Logger,
    pub serial: Serial,
    pub mqtt: Mqtt,
    pub database: Database,
    pub curtain: Curtain,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        Config::builder()
            .add_source(File::with_name("configs/default"))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("CURTAIN").prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    const DEFAULT: &str = include_str!("../../configs/default.toml");

    #[test]
    fn test_default_file_deserializes() {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(DEFAULT, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.serial.baud_rate, 115_200);
        assert_eq!(settings.curtain.thresholds.dark, 300);
        assert_eq!(settings.curtain.thresholds.bright, 700);
        assert_eq!(settings.mqtt.topics.control_command, "curtain/control/command");
        assert!(settings.mqtt.credentials.is_none());
    }

    #[test]
    fn test_link_config_durations() {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(DEFAULT, FileFormat::Toml))
            .set_override("serial.timeout_ms", 250)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let link = settings.serial.link_config();
        assert_eq!(link.read_timeout, Duration::from_millis(250));
        assert_eq!(link.reset_delay, Duration::from_secs(2));
        assert_eq!(link.port, "/dev/ttyACM0");
    }
}
