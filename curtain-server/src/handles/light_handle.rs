use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::HistoryQuery;
use crate::configs::Storage;
use crate::errors::ApiError;
use crate::repositories::LightReadingRepository;
use crate::services::CurtainService;

#[derive(Clone)]
pub struct LightState {
    pub service: Arc<CurtainService>,
    pub storage: Arc<Storage>,
}

pub async fn get_current_light(State(state): State<LightState>) -> impl IntoResponse {
    let sample = state.service.latest_light();
    let timestamp = sample.map_or_else(OffsetDateTime::now_utc, |sample| sample.timestamp);

    Json(json!({
        "value": sample.map(|sample| sample.raw_value),
        "timestamp": timestamp.format(&Rfc3339).unwrap_or_default(),
        "unit": "analog (0-1023)",
    }))
}

pub async fn get_light_history(
    Query(query): Query<HistoryQuery>,
    State(state): State<LightState>,
) -> Result<impl IntoResponse, ApiError> {
    let repository = LightReadingRepository::new(state.storage.clone());
    let readings = repository.find_since(query.since(), query.limit.max(0)).await?;

    Ok(Json(json!({
        "count": readings.len(),
        "readings": readings,
    })))
}

pub async fn get_light_statistics(
    Query(query): Query<HistoryQuery>,
    State(state): State<LightState>,
) -> Result<impl IntoResponse, ApiError> {
    let repository = LightReadingRepository::new(state.storage.clone());
    let statistics = repository.statistics_since(query.since()).await?;

    Ok(Json(json!({
        "hours": query.hours(),
        "statistics": statistics,
    })))
}
