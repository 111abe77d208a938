use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use curtain_link::Command;
use serde_json::json;

use super::run_blocking;
use crate::errors::{ApiError, CurtainError};
use crate::services::CurtainService;

#[derive(Clone)]
pub struct ControlState {
    pub service: Arc<CurtainService>,
}

/// Debug pass-through, `NAME` or `NAME:PARAM`.
pub async fn execute_command(
    Path(command): Path<String>,
    State(state): State<ControlState>,
) -> Result<impl IntoResponse, ApiError> {
    let parsed: Command = command.parse().map_err(CurtainError::from)?;
    let wire = parsed.to_string();

    run_blocking(&state.service, move |service| service.send_command(&parsed)).await?;

    Ok(Json(json!({ "message": format!("Submit command: {}", wire) })))
}
