//! Handlers for the per-project training job.
//!
//! Every control call answers with the job's status snapshot.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sculpt_core::training::TrainingParams;

use crate::error::AppResult;
use crate::handlers::existing_project;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

/// POST /api/projects/{project}/train
///
/// Launch the trainer. Returns 202 with the initial status; 409 if the
/// project already has an active job or pipeline run.
pub async fn start_training(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Json(params): Json<TrainingParams>,
) -> AppResult<impl IntoResponse> {
    existing_project(&state, &project)?;
    let snapshot = state.registry.start(&project, params).await?;

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: snapshot })))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// POST /api/projects/{project}/train/pause
pub async fn pause_training(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<impl IntoResponse> {
    existing_project(&state, &project)?;
    let snapshot = state.registry.pause(&project).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// POST /api/projects/{project}/train/resume
pub async fn resume_training(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<impl IntoResponse> {
    existing_project(&state, &project)?;
    let snapshot = state.registry.resume(&project).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// POST /api/projects/{project}/train/stop
///
/// Blocks until the trainer has exited, at most the stop grace period plus
/// the kill wait.
pub async fn stop_training(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<impl IntoResponse> {
    existing_project(&state, &project)?;
    let snapshot = state.registry.stop(&project).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/projects/{project}/train/status
pub async fn training_status(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<impl IntoResponse> {
    existing_project(&state, &project)?;
    Ok(Json(DataResponse {
        data: state.registry.status(&project),
    }))
}
