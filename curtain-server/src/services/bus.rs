use rumqttc::QoS;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::models::MqttStatus;

/// Outbound side of the message bus. `publish` never blocks and reports
/// whether the message was queued.
pub trait MessageBus: Send + Sync {
    fn publish(&self, topic: &str, payload: &Value, qos: QoS) -> bool;

    fn is_connected(&self) -> bool;

    fn status(&self) -> MqttStatus;
}

/// Current time for message payloads.
pub fn timestamp() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}
