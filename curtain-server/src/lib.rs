use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use curtain_link::{DeviceController, LinkConfig, SerialPortConnector, available_ports};
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use crate::app::{AppContext, create_app};
use crate::configs::{SchemaManager, Settings, Storage};
use crate::repositories::{BRIGHT_THRESHOLD_KEY, DARK_THRESHOLD_KEY, SystemConfigRepository};
use crate::services::{CurtainService, MessageBus, MqttBridge, SqliteRecorder, spawn_background_tasks};

pub mod app;
pub mod configs;
pub mod errors;
pub mod handles;
pub mod models;
pub mod repositories;
pub mod services;

#[cfg(any(test, feature = "mock"))]
pub mod tests;

const MQTT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run(settings: &Arc<Settings>) -> anyhow::Result<()> {
    let storage = Arc::new(
        Storage::new(settings.database.clone(), SchemaManager::default())
            .await
            .context("open database")?,
    );

    let controller = Arc::new(DeviceController::new(link_config(settings), SerialPortConnector));

    let (bridge, event_loop) = MqttBridge::new(&settings.mqtt).context("configure MQTT client")?;
    let bridge = Arc::new(bridge);

    let service = Arc::new(CurtainService::new(
        controller.clone(),
        Arc::new(SqliteRecorder::new(storage.clone(), Handle::current())),
        bridge.clone() as Arc<dyn MessageBus>,
        settings.mqtt.topics.clone(),
        settings.curtain.clone(),
    ));
    service.register_callbacks();
    restore_thresholds(&service, &storage).await;

    let mut mqtt_task = bridge.start(event_loop, {
        let service = service.clone();
        move |payload| {
            let service = service.clone();
            tokio::task::spawn_blocking(move || service.handle_remote_command(&payload));
        }
    });

    if settings.serial.auto_connect {
        let controller = controller.clone();
        let connected = tokio::task::spawn_blocking(move || controller.connect()).await?;

        match connected {
            Ok(()) => tracing::info!("device connected"),
            Err(e) => tracing::error!("failed to connect to device, running without hardware: {}", e),
        }
    }

    let tasks = spawn_background_tasks(service.clone(), storage.clone(), settings);

    let app = create_app(&AppContext {
        storage: storage.clone(),
        service: service.clone(),
    });

    let ip_addr = settings.server.host.parse::<IpAddr>().context("parse server host")?;
    let address = SocketAddr::from((ip_addr, settings.server.port));
    let listener = TcpListener::bind(&address).await?;

    tracing::info!("listening on {:?}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down");

    for task in tasks {
        task.abort();
    }

    tokio::task::spawn_blocking(move || controller.disconnect()).await?;
    bridge.disconnect().await;
    if tokio::time::timeout(MQTT_SHUTDOWN_TIMEOUT, &mut mqtt_task).await.is_err() {
        mqtt_task.abort();
    }

    Ok(())
}

/// An empty port setting picks the first port the system reports.
fn link_config(settings: &Settings) -> LinkConfig {
    let mut config = settings.serial.link_config();

    if config.port.is_empty() {
        match available_ports() {
            Ok(ports) if !ports.is_empty() => {
                tracing::info!("available ports: {:?}", ports);
                config.port = ports[0].clone();
            }
            Ok(_) => tracing::warn!("no serial ports found"),
            Err(e) => tracing::warn!("failed to list serial ports: {}", e),
        }
    }

    config
}

async fn restore_thresholds(service: &CurtainService, storage: &Arc<Storage>) {
    let repository = SystemConfigRepository::new(storage.clone());

    let stored = async {
        let dark = repository.find_integer(DARK_THRESHOLD_KEY).await?;
        let bright = repository.find_integer(BRIGHT_THRESHOLD_KEY).await?;
        Ok::<_, sqlx::Error>((dark, bright))
    };

    match stored.await {
        Ok((dark, bright)) => service.restore_thresholds(dark, bright),
        Err(e) => tracing::warn!("failed to load stored thresholds: {}", e),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
    }
}
