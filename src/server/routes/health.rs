//! Health check and label listing endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::backend::backend_name;
use crate::labels::LabelTable;
use crate::server::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub backend: String,
    pub num_classes: usize,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: backend_name().to_string(),
        num_classes: state.context.labels().len(),
    })
}

/// GET /classes - Label table in model output order
pub async fn list_classes(State(state): State<SharedState>) -> Json<LabelTable> {
    Json(state.context.labels().clone())
}
