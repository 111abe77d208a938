use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;

use crate::message::{CalibrationUpdate, DeviceMessage};

/// Last-known state of the device. Survives disconnects so operators can
/// still see when it was last heard from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub connected: bool,
    pub port: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    pub firmware_version: String,
    pub calibrated: bool,
    pub light_min: i32,
    pub light_max: i32,
    pub uptime_ms: u64,
}

impl DeviceStatus {
    pub fn new(port: &str) -> Self {
        Self {
            connected: false,
            port: port.to_string(),
            last_seen: None,
            firmware_version: String::from("unknown"),
            calibrated: false,
            light_min: 0,
            light_max: 1023,
            uptime_ms: 0,
        }
    }
}

/// Mutex-guarded [`DeviceStatus`]. Readers only ever get a copy; writes go
/// through the named transitions below, which are crate-private.
pub struct StatusModel {
    inner: Mutex<DeviceStatus>,
}

impl StatusModel {
    pub fn new(port: &str) -> Self {
        Self {
            inner: Mutex::new(DeviceStatus::new(port)),
        }
    }

    pub fn snapshot(&self) -> DeviceStatus {
        self.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn lock(&self) -> MutexGuard<'_, DeviceStatus> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark_connected(&self, port: &str) {
        let mut status = self.lock();
        status.connected = true;
        status.port = port.to_string();
        status.last_seen = Some(OffsetDateTime::now_utc());
    }

    /// Returns `true` only for the call that actually flipped the flag.
    pub(crate) fn mark_disconnected(&self) -> bool {
        let mut status = self.lock();
        let was_connected = status.connected;
        status.connected = false;
        was_connected
    }

    pub(crate) fn update_calibration(&self, update: &CalibrationUpdate) {
        let mut status = self.lock();

        if let Some(calibrated) = update.calibrated {
            status.calibrated = calibrated;
        }
        if let Some(light_min) = update.light_min {
            status.light_min = light_min;
        }
        if let Some(light_max) = update.light_max {
            status.light_max = light_max;
        }

        tracing::info!(
            "calibration: {}, range: {}-{}",
            status.calibrated,
            status.light_min,
            status.light_max
        );
    }

    pub(crate) fn update_firmware(&self, version: &str) {
        self.lock().firmware_version = version.to_string();
    }

    pub(crate) fn update_uptime(&self, uptime_ms: u64) {
        self.lock().uptime_ms = uptime_ms;
    }

    pub(crate) fn touch_last_seen(&self) {
        self.lock().last_seen = Some(OffsetDateTime::now_utc());
    }

    /// Built-in side effects of a decoded message.
    pub(crate) fn apply(&self, message: &DeviceMessage) {
        match message {
            DeviceMessage::Calibration(update) => self.update_calibration(update),
            DeviceMessage::Version(version) | DeviceMessage::Ready(version) => {
                self.update_firmware(version)
            }
            DeviceMessage::Uptime(uptime_ms) => self.update_uptime(*uptime_ms),
            _ => {}
        }

        self.touch_last_seen();
    }
}
