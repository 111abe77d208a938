use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use curtain_link::{Command, DeviceController, DeviceMessage, DeviceStatus, MessageKind};
use rumqttc::QoS;
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::configs::{Curtain, Topics};
use crate::errors::CurtainError;
use crate::models::{
    CurtainPosition, CurtainState, LightSample, MotorState, SystemMode, SystemSettings, SystemStatus, Trigger,
};
use crate::services::bus::timestamp;
use crate::services::{MessageBus, Recorder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CurtainAction {
    Open,
    Close,
    Stop,
}

impl CurtainAction {
    pub fn parse(action: &str) -> Result<Self, CurtainError> {
        match action.trim().to_lowercase().as_str() {
            "open" => Ok(CurtainAction::Open),
            "close" => Ok(CurtainAction::Close),
            "stop" => Ok(CurtainAction::Stop),
            _ => Err(CurtainError::InvalidAction(action.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CurtainAction::Open => "open",
            CurtainAction::Close => "close",
            CurtainAction::Stop => "stop",
        }
    }

    fn command(&self) -> Command {
        match self {
            CurtainAction::Open => Command::OpenCurtain,
            CurtainAction::Close => Command::CloseCurtain,
            CurtainAction::Stop => Command::StopMotor,
        }
    }
}

/// Movement the device is expected to make on its own in auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAction {
    Opening,
    Closing,
}

impl AutoAction {
    pub fn operation(&self) -> &'static str {
        match self {
            AutoAction::Opening => "auto_opening",
            AutoAction::Closing => "auto_closing",
        }
    }

    pub fn trigger(&self) -> Trigger {
        match self {
            AutoAction::Opening => Trigger::AutoDark,
            AutoAction::Closing => Trigger::AutoBright,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdUpdate {
    pub dark: i32,
    pub bright: i32,
    /// Values that passed the range check and were applied.
    pub accepted_dark: Option<u16>,
    pub accepted_bright: Option<u16>,
    /// Whether the device was connected and received the new values.
    pub forwarded: bool,
}

struct Runtime {
    curtain: CurtainState,
    settings: SystemSettings,
    latest_light: Option<LightSample>,
    last_auto_action: Option<Instant>,
}

/// Application layer over the serial link: keeps the curtain state in sync
/// with device reports, persists history, publishes to the bus and runs the
/// operations exposed over HTTP and MQTT.
pub struct CurtainService {
    controller: Arc<DeviceController>,
    recorder: Arc<dyn Recorder>,
    bus: Arc<dyn MessageBus>,
    topics: Topics,
    config: Curtain,
    runtime: Mutex<Runtime>,
    startup_time: OffsetDateTime,
}

impl CurtainService {
    pub fn new(
        controller: Arc<DeviceController>,
        recorder: Arc<dyn Recorder>,
        bus: Arc<dyn MessageBus>,
        topics: Topics,
        config: Curtain,
    ) -> Self {
        let runtime = Runtime {
            curtain: CurtainState::new(config.motor.default_speed),
            settings: SystemSettings {
                auto_mode_enabled: false,
                threshold_dark: config.thresholds.dark,
                threshold_bright: config.thresholds.bright,
                hysteresis: config.thresholds.hysteresis,
                motor_speed: config.motor.default_speed,
            },
            latest_light: None,
            last_auto_action: None,
        };

        Self {
            controller,
            recorder,
            bus,
            topics,
            config,
            runtime: Mutex::new(runtime),
            startup_time: OffsetDateTime::now_utc(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn controller(&self) -> &Arc<DeviceController> {
        &self.controller
    }

    pub fn config(&self) -> &Curtain {
        &self.config
    }

    /// Routes device reports to this service. Handlers hold a weak
    /// reference, so the controller does not keep the service alive.
    pub fn register_callbacks(self: &Arc<Self>) {
        let kinds = [
            MessageKind::Light,
            MessageKind::Position,
            MessageKind::Motor,
            MessageKind::Mode,
            MessageKind::Error,
            MessageKind::Calibration,
            MessageKind::Uptime,
            MessageKind::Version,
            MessageKind::Ready,
        ];

        for kind in kinds {
            let service = Arc::downgrade(self);
            self.controller.router().register(kind, move |message| match service.upgrade() {
                Some(service) => service.handle_device_message(message),
                None => Ok(()),
            });
        }
    }

    pub fn handle_device_message(&self, message: &DeviceMessage) -> anyhow::Result<()> {
        match message {
            DeviceMessage::Light(value) => {
                self.lock().latest_light = Some(LightSample {
                    timestamp: OffsetDateTime::now_utc(),
                    raw_value: *value,
                });
                self.recorder.insert_light_reading(*value);
            }
            DeviceMessage::Position(position) => {
                let parsed: CurtainPosition = position.parse()?;
                {
                    let mut runtime = self.lock();
                    runtime.curtain.position = parsed;
                    runtime.curtain.touch();
                }

                self.publish(
                    &self.topics.position_status,
                    &json!({ "position": parsed.as_str(), "timestamp": timestamp() }),
                    QoS::AtLeastOnce,
                );
                tracing::info!("curtain position updated: {}", parsed);
            }
            DeviceMessage::Motor(motor) => {
                let parsed: MotorState = motor.parse()?;
                let mut runtime = self.lock();
                runtime.curtain.motor_state = parsed;
                runtime.curtain.touch();
            }
            DeviceMessage::Mode(mode) => {
                let parsed: SystemMode = mode.parse()?;
                let mut runtime = self.lock();
                runtime.curtain.mode = parsed;
                runtime.curtain.touch();
                runtime.settings.auto_mode_enabled = parsed == SystemMode::Auto;

                tracing::info!("mode confirmed by device: {}", parsed);
            }
            DeviceMessage::Error(error) => {
                self.recorder.log_error("arduino_error", error, "arduino");
                self.publish(
                    &self.topics.alerts,
                    &json!({ "timestamp": timestamp(), "error_type": "arduino", "message": error }),
                    QoS::AtLeastOnce,
                );
            }
            DeviceMessage::Calibration(_)
            | DeviceMessage::Uptime(_)
            | DeviceMessage::Version(_)
            | DeviceMessage::Ready(_) => {
                self.publish_status()?;
            }
            _ => {}
        }

        Ok(())
    }

    fn publish(&self, topic: &str, payload: &Value, qos: QoS) -> bool {
        self.bus.is_connected() && self.bus.publish(topic, payload, qos)
    }

    pub fn is_connected(&self) -> bool {
        self.controller.is_connected()
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.controller.status()
    }

    pub fn curtain_state(&self) -> CurtainState {
        self.lock().curtain.clone()
    }

    pub fn system_settings(&self) -> SystemSettings {
        self.lock().settings.clone()
    }

    pub fn latest_light(&self) -> Option<LightSample> {
        self.lock().latest_light
    }

    fn latest_light_value(&self) -> Option<i32> {
        self.lock().latest_light.map(|sample| sample.raw_value)
    }

    pub fn system_status(&self) -> SystemStatus {
        let (curtain, settings, latest_light) = {
            let runtime = self.lock();
            (runtime.curtain.clone(), runtime.settings.clone(), runtime.latest_light)
        };
        let now = OffsetDateTime::now_utc();

        SystemStatus {
            device: self.controller.status(),
            mqtt: self.bus.status(),
            curtain,
            settings,
            latest_light,
            startup_time: self.startup_time,
            uptime_seconds: (now - self.startup_time).as_seconds_f64(),
        }
    }

    fn send(&self, command: &Command) -> Result<(), CurtainError> {
        if !self.controller.is_connected() {
            return Err(CurtainError::NotConnected);
        }

        Ok(self.controller.send(command)?)
    }

    /// Blocks on the serial writer.
    pub fn control(&self, action: CurtainAction, trigger: Trigger) -> Result<(), CurtainError> {
        self.send(&action.command())?;

        if action != CurtainAction::Stop {
            self.recorder.log_operation(action.as_str(), trigger, self.latest_light_value());
        }

        tracing::info!("curtain {} requested via {}", action.as_str(), trigger.as_str());
        Ok(())
    }

    /// Commands arriving on the bus control topic, `{"command": "open"}`.
    pub fn handle_remote_command(&self, payload: &Value) {
        let command = payload
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();

        tracing::info!("received MQTT command: {}", command);

        if !self.is_connected() {
            tracing::warn!("cannot execute command {}: device not connected", command);
            return;
        }

        let result = match command.as_str() {
            "calibrate" => self.calibrate(),
            other => match CurtainAction::parse(other) {
                Ok(action) => self.control(action, Trigger::Mqtt),
                Err(_) => {
                    tracing::warn!("unknown MQTT command: {}", command);
                    return;
                }
            },
        };

        if let Err(e) = result {
            tracing::error!("error executing MQTT command {}: {}", command, e);
        }
    }

    /// Sends the mode command. The mode itself only changes once the device
    /// reports it back.
    pub fn request_mode(&self, mode: &str) -> Result<SystemMode, CurtainError> {
        let mode: SystemMode = mode.parse().map_err(|_| CurtainError::InvalidMode(mode.to_string()))?;

        let command = match mode {
            SystemMode::Auto => Command::AutoMode,
            SystemMode::Manual => Command::ManualMode,
        };
        self.send(&command)?;

        Ok(mode)
    }

    pub fn mode_confirm_delay(&self) -> Duration {
        Duration::from_millis(self.config.mode_confirm_delay_ms)
    }

    pub fn set_speed(&self, speed: i64) -> Result<u8, CurtainError> {
        let command = Command::set_speed(speed).map_err(|_| CurtainError::InvalidSpeed(speed))?;
        let Command::SetSpeed(speed) = command else {
            return Err(CurtainError::InvalidSpeed(speed));
        };

        self.send(&command)?;

        let mut runtime = self.lock();
        runtime.curtain.motor_speed = speed;
        runtime.settings.motor_speed = speed;

        Ok(speed)
    }

    pub fn calibrate(&self) -> Result<(), CurtainError> {
        self.send(&Command::CalibrateLight)?;

        tracing::info!("light calibration started");
        Ok(())
    }

    /// Debug pass-through.
    pub fn send_command(&self, command: &Command) -> Result<(), CurtainError> {
        self.send(command)
    }

    pub fn thresholds(&self) -> (i32, i32) {
        let runtime = self.lock();
        (runtime.settings.threshold_dark, runtime.settings.threshold_bright)
    }

    /// Values outside the sensor range are ignored. Accepted values are kept
    /// locally even when the device is offline.
    pub fn update_thresholds(&self, dark: Option<i64>, bright: Option<i64>) -> Result<ThresholdUpdate, CurtainError> {
        let dark = dark.and_then(|value| Command::set_open_threshold(value).ok());
        let bright = bright.and_then(|value| Command::set_close_threshold(value).ok());
        let connected = self.is_connected();

        let accepted_dark = self.apply_threshold(dark, connected)?;
        let accepted_bright = self.apply_threshold(bright, connected)?;

        let (dark, bright) = self.thresholds();
        Ok(ThresholdUpdate {
            dark,
            bright,
            accepted_dark,
            accepted_bright,
            forwarded: connected,
        })
    }

    fn apply_threshold(&self, command: Option<Command>, connected: bool) -> Result<Option<u16>, CurtainError> {
        let Some(command) = command else {
            return Ok(None);
        };

        let value = match command {
            Command::SetOpenThreshold(value) => {
                self.lock().settings.threshold_dark = i32::from(value);
                value
            }
            Command::SetCloseThreshold(value) => {
                self.lock().settings.threshold_bright = i32::from(value);
                value
            }
            _ => return Ok(None),
        };

        if connected {
            self.send(&command)?;
        }

        Ok(Some(value))
    }

    /// Restores thresholds saved by an earlier run.
    pub fn restore_thresholds(&self, dark: Option<i64>, bright: Option<i64>) {
        let mut runtime = self.lock();

        if let Some(Command::SetOpenThreshold(dark)) = dark.and_then(|v| Command::set_open_threshold(v).ok()) {
            runtime.settings.threshold_dark = i32::from(dark);
        }
        if let Some(Command::SetCloseThreshold(bright)) = bright.and_then(|v| Command::set_close_threshold(v).ok()) {
            runtime.settings.threshold_bright = i32::from(bright);
        }
    }

    /// One pass of the auto-mode observer. The device moves the motor itself;
    /// this only records what it is expected to do.
    pub fn auto_mode_check(&self, now: Instant) -> Option<AutoAction> {
        if !self.is_connected() {
            return None;
        }

        let min_interval = Duration::from_secs(self.config.auto_min_action_secs);

        let (action, light) = {
            let mut runtime = self.lock();

            if !runtime.settings.auto_mode_enabled {
                return None;
            }
            if runtime.last_auto_action.is_some_and(|last| now.duration_since(last) < min_interval) {
                return None;
            }

            let light = runtime.latest_light?.raw_value;
            let position = runtime.curtain.position;

            let action = if light < runtime.settings.threshold_dark && position != CurtainPosition::Open {
                AutoAction::Opening
            } else if light > runtime.settings.threshold_bright && position != CurtainPosition::Closed {
                AutoAction::Closing
            } else {
                return None;
            };

            runtime.last_auto_action = Some(now);
            (action, light)
        };

        tracing::info!("auto mode: curtain {} (light: {})", action.operation(), light);
        self.recorder.log_operation(action.operation(), action.trigger(), Some(light));

        Some(action)
    }

    pub fn publish_light(&self) -> bool {
        match self.latest_light() {
            Some(sample) if sample.raw_value > 0 => self.publish(
                &self.topics.light_reading,
                &json!({ "value": sample.raw_value, "timestamp": timestamp() }),
                QoS::AtMostOnce,
            ),
            _ => false,
        }
    }

    pub fn publish_heartbeat(&self) -> bool {
        self.publish(
            &self.topics.heartbeat,
            &json!({ "timestamp": timestamp(), "status": "alive" }),
            QoS::AtMostOnce,
        )
    }

    pub fn publish_status(&self) -> anyhow::Result<bool> {
        let status = serde_json::to_value(self.system_status()).context("serialize system status")?;

        Ok(self.publish(&self.topics.system_status, &status, QoS::AtLeastOnce))
    }
}
