use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the COLMAP binary runs.
    pub colmap_available: bool,
    /// Whether training jobs can be paused and resumed on this host.
    pub pause_supported: bool,
    /// Open progress stream connections.
    pub subscribers: usize,
}

/// GET /health -- returns service and tool health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let colmap_available = state.colmap.check_installation().await;
    let status = if colmap_available { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        colmap_available,
        pause_supported: sculpt_jobs::signals::supports_suspend(),
        subscribers: state.broadcaster.subscriber_count().await,
    })
}

/// Mount health check routes (root-level, NOT under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
