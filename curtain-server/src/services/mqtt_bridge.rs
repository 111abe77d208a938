use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use std::{fs, io};

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::configs::Mqtt;
use crate::models::MqttStatus;
use crate::services::MessageBus;

/// MQTT client that publishes device events and feeds control commands back
/// to a callback.
pub struct MqttBridge {
    client: AsyncClient,
    control_topic: String,
    retry_delay: Duration,
    status: Mutex<MqttStatus>,
    stopping: AtomicBool,
}

impl MqttBridge {
    /// Nothing goes on the wire until the returned event loop is driven by
    /// [`MqttBridge::start`].
    pub fn new(mqtt: &Mqtt) -> Result<(Self, EventLoop), io::Error> {
        let mut options = MqttOptions::new(&mqtt.client_id, &mqtt.host, mqtt.port);
        options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_secs.max(5)));

        if let Some(credentials) = &mqtt.credentials {
            options.set_credentials(&credentials.username, &credentials.password);
        }

        if let Some(tls) = &mqtt.tls {
            let ca = fs::read(&tls.ca_path)?;
            let client_auth = match (&tls.cert_path, &tls.key_path) {
                (Some(cert_path), Some(key_path)) => Some((fs::read(cert_path)?, fs::read(key_path)?)),
                _ => None,
            };

            options.set_transport(Transport::Tls(TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth,
            }));
        }

        let (client, event_loop) = AsyncClient::new(options, 10);

        let bridge = Self {
            client,
            control_topic: mqtt.topics.control_command.clone(),
            retry_delay: Duration::from_secs(mqtt.retry_delay_secs.max(1)),
            status: Mutex::new(MqttStatus::new(&format!("{}:{}", mqtt.host, mqtt.port))),
            stopping: AtomicBool::new(false),
        };

        Ok((bridge, event_loop))
    }

    fn lock(&self) -> MutexGuard<'_, MqttStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drives the connection. Reconnects after `retry_delay` on errors and
    /// resubscribes to the control topic on every connect.
    pub fn start<F>(self: &Arc<Self>, mut event_loop: EventLoop, on_command: F) -> JoinHandle<()>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let bridge = self.clone();

        tokio::spawn(async move {
            tracing::info!("connecting to MQTT broker at {}", bridge.lock().broker);

            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => bridge.on_connack(ack.code),
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        bridge.handle_publish(&publish.topic, &publish.payload, &on_command)
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        bridge.lock().connected = false;
                        tracing::info!("MQTT disconnected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        bridge.lock().connected = false;

                        if bridge.stopping.load(Ordering::Acquire) {
                            break;
                        }

                        tracing::error!("MQTT error: {}", e);
                        tokio::time::sleep(bridge.retry_delay).await;
                    }
                }
            }

            tracing::info!("MQTT event loop stopped");
        })
    }

    fn on_connack(&self, code: ConnectReturnCode) {
        if code != ConnectReturnCode::Success {
            tracing::error!("MQTT connection refused: {:?}", code);
            self.lock().connected = false;
            return;
        }

        self.lock().connected = true;
        tracing::info!("connected to MQTT broker");

        match self.client.try_subscribe(&self.control_topic, QoS::AtLeastOnce) {
            Ok(()) => tracing::info!("subscribed to control commands on {}", self.control_topic),
            Err(e) => tracing::error!("failed to subscribe to {}: {}", self.control_topic, e),
        }
    }

    fn handle_publish<F>(&self, topic: &str, payload: &[u8], on_command: &F)
    where
        F: Fn(Value),
    {
        if topic != self.control_topic {
            tracing::debug!("ignoring message on {}", topic);
            return;
        }

        let command = match serde_json::from_slice::<Value>(payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::error!("invalid JSON in MQTT message: {}", e);
                return;
            }
        };

        tracing::debug!("received message on {}: {}", topic, command);
        on_command(command);

        let mut status = self.lock();
        status.messages_received += 1;
        status.last_message = Some(OffsetDateTime::now_utc());
    }

    pub async fn disconnect(&self) {
        self.stopping.store(true, Ordering::Release);

        if let Err(e) = self.client.disconnect().await {
            tracing::warn!("MQTT disconnect failed: {}", e);
        }

        self.lock().connected = false;
        tracing::info!("disconnected from MQTT broker");
    }
}

impl MessageBus for MqttBridge {
    fn publish(&self, topic: &str, payload: &Value, qos: QoS) -> bool {
        if !self.is_connected() {
            tracing::debug!("not publishing to {}: broker offline", topic);
            return false;
        }

        if let Err(e) = self.client.try_publish(topic, qos, false, payload.to_string()) {
            tracing::warn!("failed to publish to {}: {}", topic, e);
            return false;
        }

        let mut status = self.lock();
        status.messages_sent += 1;
        status.last_publish = Some(OffsetDateTime::now_utc());

        true
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn status(&self) -> MqttStatus {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;

    use super::*;
    use crate::tests::test_mqtt;

    #[test]
    fn test_publish_requires_connection() {
        let (bridge, _event_loop) = MqttBridge::new(&test_mqtt()).unwrap();

        assert!(!bridge.publish("curtain/system/heartbeat", &json!({"status": "alive"}), QoS::AtMostOnce));
        assert_eq!(bridge.status().messages_sent, 0);
        assert_eq!(bridge.status().broker, "localhost:1883");
    }

    #[test]
    fn test_publish_counts_messages() {
        let (bridge, _event_loop) = MqttBridge::new(&test_mqtt()).unwrap();
        bridge.lock().connected = true;

        assert!(bridge.publish("curtain/light/reading", &json!({"value": 512}), QoS::AtMostOnce));

        let status = bridge.status();
        assert_eq!(status.messages_sent, 1);
        assert!(status.last_publish.is_some());
    }

    #[test]
    fn test_control_messages_reach_callback() {
        let (bridge, _event_loop) = MqttBridge::new(&test_mqtt()).unwrap();
        let received = StdMutex::new(Vec::new());
        let on_command = |value: Value| received.lock().unwrap().push(value);

        bridge.handle_publish("curtain/control/command", br#"{"command":"open"}"#, &on_command);
        bridge.handle_publish("curtain/control/command", b"not json", &on_command);
        bridge.handle_publish("curtain/other", br#"{"command":"close"}"#, &on_command);

        assert_eq!(*received.lock().unwrap(), vec![json!({"command": "open"})]);
        assert_eq!(bridge.status().messages_received, 1);
    }
}
