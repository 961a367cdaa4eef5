//! Handlers for sparse and dense reconstruction runs.
//!
//! Both endpoints claim the project's slot, start the run on a background
//! task and return 202 immediately.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use sculpt_core::error::CoreError;
use sculpt_core::reconstruction::ReconstructionParams;
use sculpt_jobs::PipelineKind;

use crate::error::AppResult;
use crate::handlers::{existing_project, spawn_pipeline};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/projects/{project}/reconstruction
pub async fn start_reconstruction(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Json(params): Json<ReconstructionParams>,
) -> AppResult<impl IntoResponse> {
    params.validate().map_err(CoreError::Validation)?;
    let layout = existing_project(&state, &project)?;
    let guard = state.registry.begin_pipeline(&project, PipelineKind::Reconstruction)?;

    tracing::info!(
        project = %project,
        camera_model = %params.camera_model,
        quality = %params.quality,
        dense = params.dense_reconstruction,
        "Reconstruction requested",
    );

    let colmap = Arc::clone(&state.colmap);
    let accepted = spawn_pipeline(guard, async move { colmap.process(&project, &layout, &params).await });

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}

/// POST /api/projects/{project}/reconstruction/dense
pub async fn start_dense_reconstruction(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> AppResult<impl IntoResponse> {
    let layout = existing_project(&state, &project)?;
    let guard = state
        .registry
        .begin_pipeline(&project, PipelineKind::DenseReconstruction)?;

    tracing::info!(project = %project, "Dense reconstruction requested");

    let colmap = Arc::clone(&state.colmap);
    let accepted = spawn_pipeline(guard, async move { colmap.dense_reconstruction(&project, &layout).await });

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}
