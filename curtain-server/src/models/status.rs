use curtain_link::DeviceStatus;
use serde::Serialize;
use time::OffsetDateTime;

use super::{CurtainState, LightSample, SystemSettings};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MqttStatus {
    pub connected: bool,
    pub broker: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_publish: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message: Option<OffsetDateTime>,
    pub messages_sent: u64,
    pub messages_received: u64,
}

impl MqttStatus {
    pub fn new(broker: &str) -> Self {
        Self {
            broker: broker.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub device: DeviceStatus,
    pub mqtt: MqttStatus,
    pub curtain: CurtainState,
    pub settings: SystemSettings,
    pub latest_light: Option<LightSample>,
    #[serde(with = "time::serde::rfc3339")]
    pub startup_time: OffsetDateTime,
    pub uptime_seconds: f64,
}
