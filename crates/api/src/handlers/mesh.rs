//! Handlers for mesh extraction and decimation.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sculpt_core::error::CoreError;
use sculpt_core::mesh::MeshExtractionParams;
use sculpt_jobs::PipelineKind;
use sculpt_pipeline::artifacts::find_checkpoint;

use crate::error::{AppError, AppResult};
use crate::handlers::{existing_project, spawn_pipeline};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DecimateRequest {
    pub target_faces: u64,
}

#[derive(Debug, Serialize)]
pub struct DecimateResponse {
    pub output: String,
}

/// POST /api/projects/{project}/extract-mesh
///
/// The checkpoint is resolved up front so an unknown selector is a 404
/// rather than a failed background run.
pub async fn extract_mesh(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Json(params): Json<MeshExtractionParams>,
) -> AppResult<impl IntoResponse> {
    params.validate().map_err(CoreError::Validation)?;
    let layout = existing_project(&state, &project)?;
    find_checkpoint(&layout.checkpoints_dir(), &params.checkpoint).await?;

    let guard = state.registry.begin_pipeline(&project, PipelineKind::MeshExtraction)?;
    tracing::info!(
        project = %project,
        checkpoint = %params.checkpoint,
        resolution = params.resolution,
        "Mesh extraction requested",
    );

    let extractor = Arc::clone(&state.extractor);
    let accepted = spawn_pipeline(guard, async move { extractor.extract(&project, &layout, &params).await });

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: accepted })))
}

/// POST /api/projects/{project}/meshes/{file}/decimate
///
/// Runs synchronously and returns the path of the decimated mesh.
pub async fn decimate_mesh(
    State(state): State<AppState>,
    Path((project, file)): Path<(String, String)>,
    Json(input): Json<DecimateRequest>,
) -> AppResult<impl IntoResponse> {
    if input.target_faces == 0 {
        return Err(AppError::BadRequest("target_faces must be greater than zero".into()));
    }
    if !is_plain_file_name(&file) {
        return Err(AppError::BadRequest(format!("invalid mesh file name '{file}'")));
    }
    let layout = existing_project(&state, &project)?;

    let output = state
        .extractor
        .decimate(&layout.meshes_dir().join(&file), input.target_faces)
        .await?;

    tracing::info!(project = %project, mesh = %file, target_faces = input.target_faces, "Mesh decimated");
    Ok(Json(DataResponse {
        data: DecimateResponse {
            output: output.display().to_string(),
        },
    }))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && std::path::Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_cannot_escape_the_meshes_dir() {
        assert!(is_plain_file_name("mesh_latest.ply"));
        assert!(!is_plain_file_name("../mesh.ply"));
        assert!(!is_plain_file_name("sub/mesh.ply"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(""));
    }
}
