use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde_json::json;

use super::{HistoryQuery, run_blocking};
use crate::configs::Storage;
use crate::errors::ApiError;
use crate::repositories::{CurtainOperationRepository, ErrorLogRepository};
use crate::services::CurtainService;

#[derive(Clone)]
pub struct SystemState {
    pub service: Arc<CurtainService>,
    pub storage: Arc<Storage>,
}

pub async fn get_system_status(State(state): State<SystemState>) -> impl IntoResponse {
    Json(state.service.system_status())
}

pub async fn calibrate(State(state): State<SystemState>) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state.service, |service| service.calibrate()).await?;

    Ok(Json(json!({ "status": "Calibration started", "duration": "10 seconds" })))
}

pub async fn connect_device(State(state): State<SystemState>) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state.service, |service| Ok(service.controller().connect()?)).await?;

    Ok(Json(json!({
        "status": "connected",
        "device": state.service.device_status(),
    })))
}

pub async fn disconnect_device(State(state): State<SystemState>) -> Result<impl IntoResponse, ApiError> {
    run_blocking(&state.service, |service| {
        service.controller().disconnect();
        Ok(())
    })
    .await?;

    Ok(Json(json!({
        "status": "disconnected",
        "device": state.service.device_status(),
    })))
}

pub async fn get_operations(
    Query(query): Query<HistoryQuery>,
    State(state): State<SystemState>,
) -> Result<impl IntoResponse, ApiError> {
    let repository = CurtainOperationRepository::new(state.storage.clone());
    let operations = repository.find_since(query.since(), query.limit.max(0)).await?;

    Ok(Json(json!({
        "count": operations.len(),
        "operations": operations,
    })))
}

pub async fn get_errors(
    Query(query): Query<HistoryQuery>,
    State(state): State<SystemState>,
) -> Result<impl IntoResponse, ApiError> {
    let repository = ErrorLogRepository::new(state.storage.clone());
    let errors = repository.find_since(query.since(), query.limit.max(0)).await?;

    Ok(Json(json!({
        "count": errors.len(),
        "errors": errors,
    })))
}
