//! HTTP server
//!
//! Routes:
//! - `GET /` upload page
//! - `POST /predict/` (and `/predict`) image classification
//! - `GET /health` liveness and build info
//! - `GET /classes` label table

pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::inference::InferenceContext;
use crate::utils::error::Result;
use crate::utils::format_bytes;

pub use state::{AppState, SharedState};

/// Build the router for the given state
pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(routes::home::index))
        .route("/predict/", post(routes::predict::predict))
        .route("/predict", post(routes::predict::predict))
        .route("/health", get(routes::health::health_check))
        .route("/classes", get(routes::health::list_classes))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind and serve until the process is stopped
pub async fn serve(config: ServerConfig, context: InferenceContext) -> Result<()> {
    let addr = config.socket_addr()?;

    info!("Upload limit: {}", format_bytes(config.max_upload_bytes));
    info!("Error status policy: {:?}", config.error_status);

    let state = Arc::new(AppState::new(config, context));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
