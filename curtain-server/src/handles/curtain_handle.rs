use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::run_blocking;
use crate::configs::Storage;
use crate::errors::ApiError;
use crate::models::Trigger;
use crate::repositories::{BRIGHT_THRESHOLD_KEY, DARK_THRESHOLD_KEY, SystemConfigRepository};
use crate::services::{CurtainAction, CurtainService};

#[derive(Clone, Serialize, Deserialize)]
pub struct ControlBody {
    #[serde(default)]
    pub action: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModeBody {
    #[serde(default)]
    pub mode: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SpeedBody {
    pub speed: i64,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ThresholdBody {
    pub dark_threshold: Option<i64>,
    pub bright_threshold: Option<i64>,
}

#[derive(Clone)]
pub struct CurtainApiState {
    pub service: Arc<CurtainService>,
    pub storage: Arc<Storage>,
}

pub async fn control_curtain(
    State(state): State<CurtainApiState>,
    Json(body): Json<ControlBody>,
) -> Result<impl IntoResponse, ApiError> {
    let action = CurtainAction::parse(&body.action)?;

    run_blocking(&state.service, move |service| service.control(action, Trigger::Api)).await?;

    Ok(Json(json!({ "status": "success", "action": action.as_str() })))
}

pub async fn get_curtain_status(State(state): State<CurtainApiState>) -> impl IntoResponse {
    Json(state.service.curtain_state())
}

/// The mode is never set here. The answer reflects whatever the device
/// reported within the confirmation delay.
pub async fn set_mode(
    State(state): State<CurtainApiState>,
    Json(body): Json<ModeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let requested = run_blocking(&state.service, move |service| service.request_mode(&body.mode)).await?;

    tokio::time::sleep(state.service.mode_confirm_delay()).await;

    let actual = state.service.curtain_state().mode;
    if actual == requested {
        tracing::info!("mode successfully changed to {}", requested);
        Ok(Json(json!({ "status": "success", "mode": requested })))
    } else {
        tracing::warn!("mode change requested to {} but device is in {}", requested, actual);
        Ok(Json(json!({ "status": "warning", "requested": requested, "actual": actual })))
    }
}

pub async fn set_speed(
    State(state): State<CurtainApiState>,
    Json(body): Json<SpeedBody>,
) -> Result<impl IntoResponse, ApiError> {
    let speed = run_blocking(&state.service, move |service| service.set_speed(body.speed)).await?;

    Ok(Json(json!({ "status": "success", "speed": speed })))
}

pub async fn get_thresholds(State(state): State<CurtainApiState>) -> impl IntoResponse {
    let (dark, bright) = state.service.thresholds();

    Json(json!({ "dark_threshold": dark, "bright_threshold": bright }))
}

pub async fn set_thresholds(
    State(state): State<CurtainApiState>,
    Json(body): Json<ThresholdBody>,
) -> Result<impl IntoResponse, ApiError> {
    let update = run_blocking(&state.service, move |service| {
        service.update_thresholds(body.dark_threshold, body.bright_threshold)
    })
    .await?;

    let repository = SystemConfigRepository::new(state.storage.clone());
    let mut tx = state.storage.get_pool().begin().await?;

    if let Some(dark) = update.accepted_dark {
        repository
            .upsert(DARK_THRESHOLD_KEY, &dark.to_string(), "int", &mut tx)
            .await?;
    }
    if let Some(bright) = update.accepted_bright {
        repository
            .upsert(BRIGHT_THRESHOLD_KEY, &bright.to_string(), "int", &mut tx)
            .await?;
    }

    tx.commit().await?;

    let mut response = json!({
        "status": "success",
        "dark_threshold": update.dark,
        "bright_threshold": update.bright,
    });

    if !update.forwarded {
        response["warning"] = json!("Thresholds saved locally but not sent to the device (disconnected)");
    }

    Ok(Json(response))
}
