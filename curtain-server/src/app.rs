use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::configs::Storage;
use crate::handles::*;
use crate::services::CurtainService;

/// Everything the routes need, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub storage: Arc<Storage>,
    pub service: Arc<CurtainService>,
}

pub fn create_app(context: &AppContext) -> Router {
    let light = Router::new()
        .route("/current", get(get_current_light))
        .route("/history", get(get_light_history))
        .route("/statistics", get(get_light_statistics))
        .with_state(LightState {
            service: context.service.clone(),
            storage: context.storage.clone(),
        });

    let curtain = Router::new()
        .route("/control", post(control_curtain))
        .route("/status", get(get_curtain_status))
        .route("/mode", post(set_mode))
        .route("/speed", post(set_speed))
        .route("/thresholds", get(get_thresholds).post(set_thresholds))
        .with_state(CurtainApiState {
            service: context.service.clone(),
            storage: context.storage.clone(),
        });

    let system = Router::new()
        .route("/status", get(get_system_status))
        .route("/calibrate", post(calibrate))
        .route("/connect", post(connect_device))
        .route("/disconnect", post(disconnect_device))
        .route("/operations", get(get_operations))
        .route("/errors", get(get_errors))
        .with_state(SystemState {
            service: context.service.clone(),
            storage: context.storage.clone(),
        });

    // for debug
    let control = Router::new()
        .route("/:command", get(execute_command))
        .with_state(ControlState {
            service: context.service.clone(),
        });

    Router::new()
        .nest("/api/v1/light", light)
        .nest("/api/v1/curtain", curtain)
        .nest("/api/v1/system", system)
        .nest("/control", control)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
