use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use curtain_link::LinkConfig;
use rumqttc::QoS;
use serde_json::Value;

use crate::configs::*;
use crate::models::{MqttStatus, Trigger};
use crate::services::{MessageBus, Recorder};

pub async fn setup_test_db() -> Arc<Storage> {
    Arc::new(
        Storage::new(
            Database {
                url: String::from("sqlite::memory:"),
                clean_start: true,
                retention_days: 30,
            },
            SchemaManager::default(),
        )
        .await
        .unwrap(),
    )
}

pub fn test_topics() -> Topics {
    Topics {
        light_reading: String::from("curtain/light/reading"),
        position_status: String::from("curtain/position/status"),
        control_command: String::from("curtain/control/command"),
        system_status: String::from("curtain/system/status"),
        alerts: String::from("curtain/alerts/errors"),
        heartbeat: String::from("curtain/system/heartbeat"),
    }
}

pub fn test_mqtt() -> Mqtt {
    Mqtt {
        host: String::from("localhost"),
        port: 1883,
        client_id: String::from("curtain_test"),
        keep_alive_secs: 60,
        retry_delay_secs: 5,
        credentials: None,
        tls: None,
        topics: test_topics(),
        publish_interval: PublishInterval {
            light: 5,
            status: 10,
            heartbeat: 30,
        },
    }
}

pub fn test_curtain() -> Curtain {
    Curtain {
        thresholds: Thresholds {
            dark: 300,
            bright: 700,
            hysteresis: 50,
        },
        motor: Motor { default_speed: 100 },
        auto_interval_secs: 5,
        auto_min_action_secs: 60,
        mode_confirm_delay_ms: 0,
    }
}

/// Serial timings with every wait removed.
pub fn test_link_config() -> LinkConfig {
    LinkConfig {
        port: String::from("/dev/mock0"),
        read_timeout: Duration::from_millis(5),
        reset_delay: Duration::ZERO,
        handshake_delay: Duration::ZERO,
        handshake_gap: Duration::ZERO,
        shutdown_timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

pub fn test_settings() -> Settings {
    Settings {
        server: Server {
            host: String::from("127.0.0.1"),
            port: 0,
        },
        logger: Logger {
            level: String::from("debug"),
        },
        serial: Serial {
            port: String::from("/dev/mock0"),
            baud_rate: 115_200,
            timeout_ms: 5,
            write_timeout_ms: 1000,
            reset_delay_ms: 0,
            handshake_delay_ms: 0,
            handshake_gap_ms: 0,
            shutdown_timeout_ms: 1000,
            auto_connect: false,
        },
        mqtt: test_mqtt(),
        database: Database {
            url: String::from("sqlite::memory:"),
            clean_start: true,
            retention_days: 30,
        },
        curtain: test_curtain(),
    }
}

/// Polls until `condition` holds or two seconds pass.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    condition()
}

/// Bus that keeps everything it is asked to publish.
pub struct RecordingBus {
    connected: AtomicBool,
    published: Mutex<Vec<(String, Value, QoS)>>,
}

impl RecordingBus {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Value, QoS)> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl MessageBus for RecordingBus {
    fn publish(&self, topic: &str, payload: &Value, qos: QoS) -> bool {
        if !self.is_connected() {
            return false;
        }

        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), payload.clone(), qos));
        true
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn status(&self) -> MqttStatus {
        MqttStatus {
            connected: self.is_connected(),
            messages_sent: self.published().len() as u64,
            ..MqttStatus::new("test:1883")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Light(i32),
    Operation(String, Trigger, Option<i32>),
    Error(String, String, String),
}

/// Recorder that keeps writes in memory, in call order.
#[derive(Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<Recorded>>,
}

impl MemoryRecorder {
    pub fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn push(&self, record: Recorded) {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record);
    }
}

impl Recorder for MemoryRecorder {
    fn insert_light_reading(&self, raw_value: i32) {
        self.push(Recorded::Light(raw_value));
    }

    fn log_operation(&self, operation: &str, trigger: Trigger, light_level_before: Option<i32>) {
        self.push(Recorded::Operation(operation.to_string(), trigger, light_level_before));
    }

    fn log_error(&self, error_type: &str, message: &str, component: &str) {
        self.push(Recorded::Error(error_type.to_string(), message.to_string(), component.to_string()));
    }
}
